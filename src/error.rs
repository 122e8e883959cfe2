//! Error types for the cache engine
//!
//! Transport failures from the remote store are `StoreError`; everything the
//! engine itself rejects is a `CacheError`. Public cache operations convert
//! both into misses or no-ops, so these types mostly travel between internal
//! layers and the admin API.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Store Error Enum ==
/// Failure talking to the remote key/value store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Store unreachable or connection dropped
    #[error("Store connection error: {0}")]
    Connection(String),

    /// Store call exceeded its deadline
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Operation issued against a key holding the wrong kind of value
    #[error("Wrong value type for key: {0}")]
    WrongType(String),

    /// Pub/sub channel closed or lagged beyond recovery
    #[error("Channel error: {0}")]
    Channel(String),

    /// Store at capacity with nothing it may evict
    #[error("Store full, nothing evictable for key: {0}")]
    OutOfMemory(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Rejected input (empty key, oversized value, malformed rule)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A warming loader could not produce a value
    #[error("Loader error: {0}")]
    Loader(String),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Validation(_) | CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Loader(_) => StatusCode::BAD_GATEWAY,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Aliases ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result of a single store round-trip.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
