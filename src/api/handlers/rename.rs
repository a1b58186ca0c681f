use crate::api::error::AppError;
use crate::services::rename_service::StagedUpload;
use crate::utils::validation::{allowed_file, secure_filename};
use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::Html,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

const UPLOAD_FORM: &str = include_str!("../templates/upload.html");

/// Multipart fields accepted by `POST /`.
#[derive(ToSchema)]
pub struct RenameForm {
    /// The PDF to rename
    #[schema(value_type = String, format = Binary)]
    pub file: String,
    /// OpenAI API key used for this request only
    pub api_key: String,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

fn staging_error(e: std::io::Error) -> AppError {
    if e.to_string().contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::Filesystem(e)
    }
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "HTML upload form", content_type = "text/html")
    ),
    tag = "rename"
)]
pub async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

#[utoipa::path(
    post,
    path = "/",
    request_body(content = RenameForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File renamed and published; body links to Google Drive", content_type = "text/html"),
        (status = 400, description = "No file part, no selected file, more than one file, disallowed type or missing API key"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 422, description = "PDF text could not be extracted"),
        (status = 502, description = "Language model or Google Drive request failed")
    ),
    tag = "rename"
)]
pub async fn rename_upload(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let service = state.rename_service.clone();
    let mut api_key: Option<String> = None;
    let mut staged: Option<StagedUpload> = None;

    // Capture errors so the rest of the body can be drained before replying
    let result: Result<StagedUpload, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                // A "file" field without a filename parameter is not a file part
                let Some(original_filename) = field.file_name().map(str::to_string) else {
                    continue;
                };

                if staged.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one file may be uploaded per request".to_string(),
                    ));
                }
                if original_filename.is_empty() {
                    return Err(AppError::BadRequest("No selected file".to_string()));
                }
                if !allowed_file(&original_filename) {
                    return Err(AppError::BadRequest("File type not allowed".to_string()));
                }

                let filename = secure_filename(&original_filename);
                if filename.is_empty() {
                    return Err(AppError::BadRequest("Invalid filename".to_string()));
                }

                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                staged = Some(
                    service
                        .stage_upload(&filename, reader)
                        .await
                        .map_err(staging_error)?,
                );
            } else if name == "api_key" {
                api_key = Some(field.text().await.map_err(multipart_error)?);
            }
        }

        staged
            .take()
            .ok_or_else(|| AppError::BadRequest("No file part in the request".to_string()))
    }
    .await;

    let staged = match result {
        Ok(staged) => staged,
        Err(e) => {
            tracing::warn!("Upload rejected: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            if let Some(orphan) = staged.take() {
                let _ = tokio::fs::remove_file(&orphan.path).await;
            }
            return Err(e);
        }
    };

    let Some(api_key) = service.resolve_api_key(api_key) else {
        let _ = tokio::fs::remove_file(&staged.path).await;
        return Err(AppError::BadRequest("No API key provided".to_string()));
    };

    let artifact = service.process(staged, &api_key).await?;

    Ok(Html(format!(
        "File renamed and saved. Download from Google Drive: <a href='{link}'>{link}</a>",
        link = artifact.view_link
    )))
}
