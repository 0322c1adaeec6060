//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::{ErrorKind, SignupError};

/// Error body for every API failure.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// Application-level error type for the signup API.
#[derive(Debug, Error)]
pub enum AppError {
    /// A signup stage failed.
    #[error(transparent)]
    Signup(#[from] SignupError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn kind(&self) -> ErrorKind {
        match self {
            Self::Signup(err) => err.kind(),
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Capture server errors to Sentry
        match kind {
            ErrorKind::Internal => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Request error"
                );
            }
            ErrorKind::Timeout => tracing::warn!(error = %self, "Request timed out"),
            _ => tracing::debug!(error = %self, "Request rejected"),
        }

        let status = match kind {
            ErrorKind::BadRequest | ErrorKind::NotFound => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match kind {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::Timeout => "Request timed out".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ApiError { error: message })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
