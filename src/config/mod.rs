use std::env;
use std::path::PathBuf;

/// Google Drive OAuth material used by the publisher.
#[derive(Debug, Clone)]
pub struct GoogleDriveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,

    /// Optional parent folder for uploaded files
    pub folder_id: Option<String>,

    pub token_uri: String,
    pub upload_base_url: String,
}

impl GoogleDriveConfig {
    pub const DEFAULT_TOKEN_URI: &'static str = "https://oauth2.googleapis.com/token";
    pub const DEFAULT_UPLOAD_BASE_URL: &'static str = "https://www.googleapis.com";

    /// Returns `None` unless all three OAuth values are present.
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_var("GOOGLE_CLIENT_ID")?;
        let client_secret = non_empty_var("GOOGLE_CLIENT_SECRET")?;
        let refresh_token = non_empty_var("GOOGLE_REFRESH_TOKEN")?;

        Some(Self {
            client_id,
            client_secret,
            refresh_token,
            folder_id: non_empty_var("GOOGLE_DRIVE_FOLDER_ID"),
            token_uri: env::var("GOOGLE_TOKEN_URI")
                .unwrap_or_else(|_| Self::DEFAULT_TOKEN_URI.to_string()),
            upload_base_url: env::var("GOOGLE_UPLOAD_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_UPLOAD_BASE_URL.to_string()),
        })
    }
}

/// Runtime configuration for the rename service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Staging directory for fresh uploads (default: "uploads")
    pub upload_dir: PathBuf,

    /// Output directory for renamed files (default: "downloads")
    pub download_dir: PathBuf,

    /// Maximum request body in bytes (default: 16 MiB)
    pub max_file_size: usize,

    /// Character budget for the text sent to the model (default: 128000)
    pub max_context_chars: usize,

    /// Chat completion endpoint base (default: "https://api.openai.com/v1")
    pub openai_base_url: String,

    /// Model used for every naming request (default: "gpt-4o-mini")
    pub openai_model: String,

    /// Used when the form's api_key field is blank
    pub openai_api_key: Option<String>,

    pub llm_timeout_secs: u64,
    pub drive_timeout_secs: u64,

    /// Retries for transient model/upload failures (default: 2)
    pub max_retries: u32,
    pub retry_backoff_ms: u64,

    pub google: Option<GoogleDriveConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            download_dir: PathBuf::from("downloads"),
            max_file_size: 16 * 1024 * 1024, // 16 MiB
            max_context_chars: 128_000,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
            llm_timeout_secs: 120,
            drive_timeout_secs: 300,
            max_retries: 2,
            retry_backoff_ms: 500,
            google: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            download_dir: env::var("DOWNLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(default.download_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_context_chars: env::var("MAX_CONTEXT_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_context_chars),

            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(default.openai_base_url),

            openai_model: env::var("OPENAI_MODEL").unwrap_or(default.openai_model),

            openai_api_key: non_empty_var("OPENAI_API_KEY"),

            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.llm_timeout_secs),

            drive_timeout_secs: env::var("DRIVE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.drive_timeout_secs),

            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_retries),

            retry_backoff_ms: env::var("RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_backoff_ms),

            google: GoogleDriveConfig::from_env(),
        }
    }

    /// Config for tests and local runs: no retries, no backoff
    pub fn development() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Same as `development`, rooted in the given directories.
    pub fn with_dirs(upload_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            download_dir: download_dir.into(),
            ..Self::development()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
