//! Request DTOs for the admin API
//!
//! Bodies and query strings accepted by the handlers.

use serde::Deserialize;
use serde_json::Value;

/// Body of `PUT /cache/:namespace/:key`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetEntryRequest {
    /// Any JSON value
    pub value: Value,
    /// Optional TTL in seconds (uses the configured default if absent)
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SetEntryRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.ttl == Some(0) {
            return Some("TTL must be at least one second".to_string());
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }
}

/// Body of `POST /invalidate/pattern`.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
}

impl PatternRequest {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.trim().is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Query of `GET /metrics/history` and `GET /trends`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub hours: Option<u64>,
}

/// Query of `GET /metrics/export`. Bounds are Unix milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub to: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Query of `GET /alerts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsQuery {
    /// Include resolved alerts
    #[serde(default)]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_entry_request_defaults() {
        let req: SetEntryRequest = serde_json::from_str(r#"{"value": {"name": "ada"}}"#).unwrap();
        assert_eq!(req.value["name"], "ada");
        assert!(req.ttl.is_none());
        assert!(req.tags.is_empty());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_set_entry_request_rejects_zero_ttl_and_blank_tags() {
        let req: SetEntryRequest = serde_json::from_str(r#"{"value": 1, "ttl": 0}"#).unwrap();
        assert!(req.validate().is_some());

        let req: SetEntryRequest = serde_json::from_str(r#"{"value": 1, "tags": ["ok", " "]}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_pattern_request_validation() {
        let req = PatternRequest {
            pattern: "".to_string(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_export_query_parse() {
        let q: ExportQuery = serde_json::from_str(r#"{"from": 10, "format": "csv"}"#).unwrap();
        assert_eq!(q.from, Some(10));
        assert!(q.to.is_none());
    }
}
