//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine, persistence and admin API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid construction parameters (capacity, concurrency level)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Snapshot header or record layout is not one we understand
    #[error("Invalid snapshot format: {0}")]
    Format(String),

    /// Snapshot checksum does not match its contents
    #[error("Snapshot corrupted: checksum mismatch (expected {expected:#010x}, computed {actual:#010x})")]
    Corruption { expected: u64, actual: u64 },

    /// Underlying file system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot was requested but no snapshot path is configured
    #[error("Persistence is not enabled")]
    PersistenceDisabled,
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Config(_) => StatusCode::BAD_REQUEST,
            CacheError::PersistenceDisabled => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Format(_) | CacheError::Corruption { .. } | CacheError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;
