use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::time::sleep;

use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::services::drive::{CloudStorage, view_link};
use crate::services::extractor::TextExtractor;
use crate::services::naming::NamingAgent;
use crate::services::output::{OutputDirectory, Reservation};
use crate::utils::validation::normalize_proposed_filename;

/// An upload written to the staging directory, awaiting its new name.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub filename: String,
    pub path: PathBuf,
}

/// A renamed file in the output directory plus its Drive object.
#[derive(Debug, Clone)]
pub struct PublishedArtifact {
    pub filename: String,
    pub path: PathBuf,
    pub file_id: String,
    pub view_link: String,
}

pub struct RenameService {
    upload_dir: PathBuf,
    output: OutputDirectory,
    extractor: TextExtractor,
    naming: Arc<dyn NamingAgent>,
    storage: Arc<dyn CloudStorage>,
    default_api_key: Option<String>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl RenameService {
    pub fn new(
        config: &AppConfig,
        naming: Arc<dyn NamingAgent>,
        storage: Arc<dyn CloudStorage>,
    ) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            output: OutputDirectory::new(config.download_dir.clone()),
            extractor: TextExtractor::new(config.max_context_chars),
            naming,
            storage,
            default_api_key: config.openai_api_key.clone(),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Creates the staging and output directories if they are missing.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(self.output.root()).await?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output(&self) -> &OutputDirectory {
        &self.output
    }

    /// The form key wins; the configured key covers a blank field.
    pub fn resolve_api_key(&self, provided: Option<String>) -> Option<String> {
        provided
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.default_api_key.clone())
    }

    /// Streams an upload into the staging directory, replacing any file of the same name.
    pub async fn stage_upload<R>(&self, filename: &str, mut reader: R) -> std::io::Result<StagedUpload>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.upload_dir.join(filename);
        let mut file = tokio::fs::File::create(&path).await?;

        match tokio::io::copy(&mut reader, &mut file).await {
            Ok(bytes) => {
                tracing::info!(filename = %filename, bytes, "Staged upload");
                Ok(StagedUpload {
                    filename: filename.to_string(),
                    path,
                })
            }
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    /// Runs one staged upload through extract, name, reserve, move and upload.
    #[tracing::instrument(skip(self, staged, api_key), fields(staged = %staged.filename))]
    pub async fn process(
        &self,
        staged: StagedUpload,
        api_key: &str,
    ) -> Result<PublishedArtifact, AppError> {
        let context = self.extractor.extract_context(&staged.path).await?;
        let context = context.as_str();

        let proposed = self
            .with_retry("naming", || async move {
                self.naming
                    .propose_filename(api_key, context)
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        let final_name = normalize_proposed_filename(&proposed);
        let reservation = self.output.reserve(&final_name).await?;
        self.output.publish(&staged.path, &reservation).await?;

        let file_id = match self.upload(&reservation).await {
            Ok(id) => id,
            Err(e) => {
                self.restore_to_staging(&reservation, &staged.path).await;
                return Err(e);
            }
        };

        tracing::info!(filename = %reservation.filename, file_id = %file_id, "Published renamed PDF");

        Ok(PublishedArtifact {
            view_link: view_link(&file_id),
            filename: reservation.filename,
            path: reservation.path,
            file_id,
        })
    }

    async fn upload(&self, reservation: &Reservation) -> Result<String, AppError> {
        let path = reservation.path.as_path();
        let name = reservation.filename.as_str();
        self.with_retry("upload", || async move {
            self.storage
                .upload_pdf(path, name)
                .await
                .map_err(AppError::from)
        })
        .await
    }

    /// Keeps the output directory limited to files that actually reached Drive.
    async fn restore_to_staging(&self, reservation: &Reservation, staged: &Path) {
        match self.output.unpublish(reservation, staged).await {
            Ok(()) => tracing::warn!(
                filename = %reservation.filename,
                "Upload failed, moved file back to staging"
            ),
            Err(e) => tracing::error!(
                filename = %reservation.filename,
                "Upload failed and file could not be moved back to staging: {}",
                e
            ),
        }
    }

    /// Retries transient failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, step: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff_delay_ms(self.retry_backoff_ms, attempt);
                    tracing::warn!(
                        "{}: attempt {} failed ({}), retry {}/{} after {}ms",
                        step,
                        attempt,
                        e,
                        attempt,
                        self.max_retries,
                        backoff
                    );
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `base * 2^(attempt-1)`, saturating at `u64::MAX`.
fn backoff_delay_ms(base: u64, attempt: u32) -> u64 {
    if base == 0 {
        return 0;
    }
    2u64.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(u64::MAX)
}
