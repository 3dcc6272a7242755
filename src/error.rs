//! # Error Handling
//!
//! Defines the HTTP-facing error type and how component errors map onto it.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Layered error enums
//! - Each component (storage, audio, transcription, pipeline) owns a
//!   `thiserror` enum describing exactly what can go wrong there
//! - `AppError` is the outermost layer: it only decides the HTTP status and
//!   the message the client sees
//!
//! ### Traits for Error Conversion
//! - **From trait**: lets handlers use `?` on component errors
//! - **ResponseError trait**: converts errors to HTTP responses
//!
//! ## Response Shape:
//! Every error is rendered as the same envelope successful responses use:
//! ```json
//! { "success": false, "error": "Invalid audio file format: notes.txt" }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::pipeline::PipelineError;
use crate::storage::StorageError;

/// JSON envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Errors a handler can return.
///
/// ## Error Categories:
/// - **Internal**: server-side problems (500)
/// - **BadRequest**: the client sent something unusable (400)
/// - **PayloadTooLarge**: the upload exceeds the configured limit (413)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::failure(self.to_string()))
    }
}

/// Upload faults are the client's; everything else is ours.
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;
