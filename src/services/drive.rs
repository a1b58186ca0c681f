use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Body, Client, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

use crate::config::GoogleDriveConfig;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Google Drive authorization failed: {0}")]
    Auth(String),

    #[error("Google Drive request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Google Drive API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("resumable upload session URI missing from response")]
    MissingSessionUri,

    #[error("invalid Google Drive response: {0}")]
    InvalidResponse(String),

    #[error("failed to read upload source: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::Request(_) => true,
            DriveError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// Public view link for an uploaded object
pub fn view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view?usp=sharing", file_id)
}

#[async_trait]
pub trait CloudStorage: Send + Sync {
    /// Uploads a local PDF under `name` and returns the remote object id.
    async fn upload_pdf(&self, path: &Path, name: &str) -> Result<String, DriveError>;
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

/// Uploads to Google Drive v3 using a long-lived refresh token.
pub struct GoogleDriveStorage {
    client: Client,
    config: GoogleDriveConfig,
    cached_token: Mutex<Option<AccessToken>>,
}

impl GoogleDriveStorage {
    pub fn new(config: GoogleDriveConfig, timeout: Duration) -> Result<Self, DriveError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            cached_token: Mutex::new(None),
        })
    }

    /// Cached access token, refreshed when within five minutes of expiry.
    async fn access_token(&self) -> Result<String, DriveError> {
        let mut cached = self.cached_token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + chrono::Duration::minutes(5) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.refresh_access_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn refresh_access_token(&self) -> Result<AccessToken, DriveError> {
        let response = self
            .client
            .post(&self.config.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::Auth(format!("invalid token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed Google access token");

        Ok(AccessToken {
            token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    async fn start_resumable_session(
        &self,
        access_token: &str,
        name: &str,
        size: u64,
    ) -> Result<String, DriveError> {
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(folder_id) = &self.config.folder_id {
            metadata["parents"] = serde_json::json!([folder_id]);
        }

        let url = format!(
            "{}/upload/drive/v3/files?uploadType=resumable&fields=id",
            self.config.upload_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .header("X-Upload-Content-Type", PDF_MIME_TYPE)
            .header("X-Upload-Content-Length", size)
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(DriveError::MissingSessionUri)
    }

    async fn upload_with_token(
        &self,
        access_token: &str,
        path: &Path,
        name: &str,
    ) -> Result<String, DriveError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let session_uri = self
            .start_resumable_session(access_token, name, size)
            .await?;

        let response = self
            .client
            .put(&session_uri)
            .bearer_auth(access_token)
            .header(header::CONTENT_TYPE, PDF_MIME_TYPE)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }

        let uploaded: UploadedFile = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

        tracing::info!(file_id = %uploaded.id, size, "File uploaded to Google Drive");
        Ok(uploaded.id)
    }
}

#[async_trait]
impl CloudStorage for GoogleDriveStorage {
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    async fn upload_pdf(&self, path: &Path, name: &str) -> Result<String, DriveError> {
        let access_token = self.access_token().await?;
        let result = self.upload_with_token(&access_token, path, name).await;

        // A token revoked before its expiry must not be reused
        if let Err(DriveError::Api { status, .. }) = &result {
            if *status == StatusCode::UNAUTHORIZED {
                tracing::warn!("Access token rejected, clearing cached token");
                *self.cached_token.lock().await = None;
            }
        }

        result
    }
}

/// Stand-in used when no Google credentials are configured.
pub struct UnconfiguredStorage;

#[async_trait]
impl CloudStorage for UnconfiguredStorage {
    async fn upload_pdf(&self, _path: &Path, _name: &str) -> Result<String, DriveError> {
        Err(DriveError::Auth(
            "Google Drive credentials are not configured".to_string(),
        ))
    }
}
