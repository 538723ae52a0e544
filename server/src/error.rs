//! Request Error Types
//!
//! One taxonomy shared by the message and group services. Every variant is
//! turned into a structured JSON failure at the request boundary; none are
//! retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;

/// Errors returned by message and group operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required field is missing or malformed. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// The referenced user, message or group does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Identity or role check failed.
    #[error("{0}")]
    Forbidden(String),

    /// The supplied password did not open the message.
    #[error("Invalid password")]
    InvalidPassword,

    /// Duplicate membership or invite code.
    #[error("{0}")]
    Conflict(String),

    /// Upload or other external service failed.
    #[error("Service failure: {0}")]
    Service(String),

    /// Persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Unexpected server-side failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Shorthand for [`AppError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`AppError::Forbidden`].
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Shorthand for [`AppError::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::Conflict(_) => "CONFLICT",
            Self::Service(_) => "SERVICE_FAILURE",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidPassword => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Service(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Storage(e) => {
                error!(error = %e, "Storage failure");
                "Storage error".to_string()
            }
            Self::Internal(e) => {
                error!(error = %e, "Internal failure");
                "Internal server error".to_string()
            }
            // Service failures carry the underlying message for diagnostics
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.code(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
