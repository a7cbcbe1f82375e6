//! Error types for the object cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the object cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A required argument was missing or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A numeric or duration argument was outside its allowed range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The stored value is not of the requested type
    #[error("Type mismatch for key '{key}': expected {expected}")]
    TypeMismatch {
        /// The key that was read
        key: String,
        /// Name of the type the caller asked for
        expected: &'static str,
    },

    /// Key not found in cache (admin API only; store reads report misses as `None`)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A dependency could not be started
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// The store was created outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<notify::Error> for CacheError {
    fn from(err: notify::Error) -> Self {
        CacheError::Dependency(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidArgument(_)
            | CacheError::OutOfRange(_)
            | CacheError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Dependency(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::NoRuntime(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the object cache.
pub type Result<T> = std::result::Result<T, CacheError>;
