use crate::api::error::AppError;
use crate::utils::validation::secure_filename;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::ErrorKind;
use tokio_util::io::ReaderStream;

/// `attachment` disposition with an ASCII fallback and an RFC 5987 encoded name.
pub(crate) fn attachment_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "download.pdf"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[utoipa::path(
    get,
    path = "/downloads/{filename}",
    params(
        ("filename" = String, Path, description = "Name of a published file")
    ),
    responses(
        (status = 200, description = "File download stream", content_type = "application/pdf"),
        (status = 404, description = "File not found")
    ),
    tag = "rename"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    // Only flat names produced by the sanitizer can live in the output directory
    if filename.is_empty() || secure_filename(&filename) != filename {
        tracing::warn!("Rejected download name: {}", filename);
        return Err(AppError::NotFound("File not found".to_string()));
    }

    let path = state.rename_service.output().path_for(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(e) => return Err(AppError::Filesystem(e)),
    };

    let metadata = file.metadata().await?;
    // Zero length means a reservation placeholder whose rename is still in flight
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    tracing::info!(filename = %filename, size = metadata.len(), "Serving download");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_PDF.as_ref())
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, attachment_disposition(&filename))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}
