//! Session records and the data callers supply for them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied session contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at_epoch_ms: u64,
    pub last_activity_epoch_ms: u64,
    pub metadata: BTreeMap<String, Value>,
    /// Lifetime granted at creation; sliding reads refresh back up to it
    pub ttl_seconds: u64,
}

impl SessionRecord {
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_epoch_ms)
    }
}

/// Partial update; `None` fields are left alone and metadata is merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl SessionUpdate {
    pub(crate) fn apply(self, record: &mut SessionRecord) {
        if let Some(roles) = self.roles {
            record.roles = roles;
        }
        if let Some(permissions) = self.permissions {
            record.permissions = permissions;
        }
        if let Some(metadata) = self.metadata {
            record.metadata.extend(metadata);
        }
    }
}
