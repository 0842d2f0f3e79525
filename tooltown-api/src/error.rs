use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tooltown_core::ToolError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Application-specific error types for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Errors raised by staging, validation or an operation
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The multipart body could not be read
    #[error("Failed to read multipart body: {message}")]
    Multipart { status: StatusCode, message: String },

    /// A missing or malformed request parameter
    #[error("{0}")]
    BadRequest(String),
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Tool(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::Tool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Multipart { status, .. } => *status,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %detail, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %detail, "request rejected");
        }
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        let cases = [
            ToolError::Validation("bad".into()),
            ToolError::InvalidFormat("bad".into()),
            ToolError::invalid_pages(vec![99], 3),
            ToolError::Auth,
            ToolError::EmptyInput("No files provided".into()),
        ];
        for err in cases {
            assert_eq!(AppError::from(err).status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_server_errors_map_to_500() {
        let storage = ToolError::storage("merge", std::io::Error::other("disk full"));
        assert_eq!(AppError::from(storage).status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let timeout = ToolError::Timeout { seconds: 1 };
        assert_eq!(
            AppError::from(timeout).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detail_is_the_error_message() {
        let err = AppError::from(ToolError::invalid_pages(vec![99], 3));
        assert_eq!(err.to_string(), "Invalid page numbers: [99]. PDF has 3 pages.");
    }
}
