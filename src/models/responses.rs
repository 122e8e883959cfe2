//! Response DTOs for the admin API

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheEntry, CacheStats};
use crate::clock::{current_timestamp_ms, to_rfc3339};
use crate::invalidation::InvalidationStats;
use crate::store::StoreInfo;
use crate::warming::WarmingStats;

/// Body of `GET /cache/:namespace/:key`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub namespace: String,
    pub key: String,
    pub value: Value,
    /// Seconds of logical lifetime left
    pub ttl_remaining: u64,
    pub stored_at: String,
    pub tags: BTreeSet<String>,
}

impl From<CacheEntry> for EntryResponse {
    fn from(entry: CacheEntry) -> Self {
        Self {
            ttl_remaining: entry.remaining_secs(current_timestamp_ms()),
            stored_at: to_rfc3339(entry.stored_at_epoch_ms),
            namespace: entry.namespace,
            key: entry.key,
            value: entry.value,
            tags: entry.tags,
        }
    }
}

/// Body of a successful `PUT` or `DELETE` on an entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryActionResponse {
    pub message: String,
    pub namespace: String,
    pub key: String,
}

impl EntryActionResponse {
    pub fn stored(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(namespace.into(), key.into(), "stored")
    }

    pub fn deleted(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(namespace.into(), key.into(), "deleted")
    }

    fn new(namespace: String, key: String, action: &str) -> Self {
        Self {
            message: format!("Key '{namespace}:{key}' {action} successfully"),
            namespace,
            key,
        }
    }
}

/// Body of `GET /cache/:namespace/:key/ttl`. `ttl` is -1 when the entry is
/// absent or has no expiry.
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub namespace: String,
    pub key: String,
    pub ttl: i64,
}

/// Body of the tag and pattern invalidation endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResponse {
    pub target: String,
    pub removed: u64,
}

/// Body of `POST /alerts/:id/resolve`.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    pub id: String,
    pub resolved: bool,
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub invalidation: InvalidationStats,
    pub warming: WarmingStats,
    /// Absent when the store could not be reached
    pub store: Option<StoreInfo>,
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
