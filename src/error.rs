//! Error types for the OCR server

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::OcrError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing form field
    #[error("{0}")]
    Validation(String),

    /// Unreadable multipart body (including oversized uploads)
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),

    /// Body is not `multipart/form-data`
    #[error("{}", .0.body_text())]
    NotMultipart(#[from] MultipartRejection),

    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(msg) => {
                tracing::debug!("Rejected request: {}", msg);
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Multipart(e) => {
                tracing::debug!("Failed to read multipart body: {}", e);
                e.status()
            }
            AppError::NotMultipart(e) => {
                tracing::debug!("Rejected non-multipart request: {}", e);
                e.status()
            }
            AppError::Ocr(e @ OcrError::ServiceUnavailable) => {
                tracing::warn!("{}", e);
                e.status_code()
            }
            AppError::Ocr(e) => {
                tracing::error!("OCR failed: {}", e);
                e.status_code()
            }
        };

        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}
