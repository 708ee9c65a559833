use crate::extraction::ExtractionError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data: unsupported file type, oversized or empty upload, bad field spec
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The file is indexed but was removed from disk
    #[error("File {id} no longer exists on disk")]
    FileMissing { id: String },

    /// OCR engine, PDF rasterizer or model API failure
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::FileMissing { .. } => StatusCode::NOT_FOUND,
            Error::Extraction(_) | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::FileMissing { .. } => "File no longer exists on disk".to_string(),
            Error::Extraction(e) => format!("OCR processing failed: {e}"),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Extraction(_) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::FileMissing { .. } => {
                tracing::warn!("Indexed file missing: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "detail": self.user_message() });
        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_status_codes() {
        let bad = Error::BadRequest {
            message: "nope".to_string(),
        };
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let missing = Error::NotFound {
            resource: "File".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.user_message(), "File not found");

        let gone = Error::FileMissing { id: "abc".to_string() };
        assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);

        let upstream = Error::from(ExtractionError::ModelOutput("not json".to_string()));
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(upstream.user_message().starts_with("OCR processing failed:"));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = Error::Other(anyhow::anyhow!("connection string postgres://secret"));
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_response_body_is_json_detail() {
        let response = Error::BadRequest {
            message: "Unsupported file type: .exe".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"], "Unsupported file type: .exe");
    }
}
