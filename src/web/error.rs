//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::fmt::Display;
use tracing::error;

/// Machine-readable error category, mapped to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    NoFilePart,
    NoSelectedFile,
    InvalidFileType,
    InvalidUpload,
    NotReady,
    Internal,
}

impl ApiErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::NoFilePart
            | ApiErrorCode::NoSelectedFile
            | ApiErrorCode::InvalidFileType
            | ApiErrorCode::InvalidUpload => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotReady => StatusCode::NOT_FOUND,
            ApiErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(json!({ "error": self.message }))).into_response()
    }
}

/// Log an I/O failure and hide its details from the client.
pub fn storage_error(context: &str, e: impl Display) -> ApiError {
    error!(error = %e, "{context} failed");
    ApiError::new(ApiErrorCode::Internal, "Error processing file")
}
