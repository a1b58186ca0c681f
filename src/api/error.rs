use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::drive::DriveError;
use crate::services::extractor::ExtractionError;
use crate::services::naming::NamingError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("Upload error: {0}")]
    Upload(#[from] DriveError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Naming(_) | AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Filesystem(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Model and upload failures that may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Naming(e) => e.is_transient(),
            AppError::Upload(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg) => msg,
            AppError::Extraction(e) => {
                tracing::error!("Extraction error: {:?}", e);
                "Could not read text from the PDF".to_string()
            }
            AppError::Naming(e) => {
                tracing::error!("Naming error: {:?}", e);
                "Language model request failed".to_string()
            }
            AppError::Upload(e) => {
                tracing::error!("Upload error: {:?}", e);
                "Upload to Google Drive failed".to_string()
            }
            AppError::Filesystem(e) => {
                tracing::error!("Filesystem error: {:?}", e);
                "Internal Server Error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_is_plain_text() {
        let response = AppError::BadRequest("No selected file".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "No selected file");
    }

    #[tokio::test]
    async fn test_downstream_errors_hide_detail() {
        let err = AppError::Upload(DriveError::Auth("refresh token revoked".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_text(response).await;
        assert_eq!(body, "Upload to Google Drive failed");
        assert!(!body.contains("revoked"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Naming(NamingError::EmptyResponse).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Filesystem(std::io::Error::other("disk")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::NotFound("File not found".to_string()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_transient_classification() {
        let transient = AppError::Naming(NamingError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        });
        assert!(transient.is_transient());
        assert!(!AppError::BadRequest("x".to_string()).is_transient());
        assert!(!AppError::Upload(DriveError::MissingSessionUri).is_transient());
    }
}
