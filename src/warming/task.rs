//! Warmup tasks and their priority bands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Tasks estimated faster than this are high priority.
pub const HIGH_PRIORITY_BELOW_MS: u64 = 2_000;
/// Tasks estimated faster than this (and not high) are medium priority.
pub const MEDIUM_PRIORITY_BELOW_MS: u64 = 5_000;

// == Priority ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn from_estimate(estimated_duration_ms: u64) -> Self {
        if estimated_duration_ms < HIGH_PRIORITY_BELOW_MS {
            Priority::High
        } else if estimated_duration_ms < MEDIUM_PRIORITY_BELOW_MS {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

// == Strategy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// High band only, skipping tasks that keep failing
    HighPriority,
    /// Every band, skipping tasks that keep failing
    Standard,
    /// Every task
    Comprehensive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::HighPriority => "high-priority",
            Strategy::Standard => "standard",
            Strategy::Comprehensive => "comprehensive",
        }
    }

    /// Whether `task` takes part in this strategy.
    pub fn includes(&self, task: &WarmupTask, error_threshold: u32) -> bool {
        let healthy = task.consecutive_errors < error_threshold;
        match self {
            Strategy::HighPriority => healthy && task.priority() == Priority::High,
            Strategy::Standard => healthy,
            Strategy::Comprehensive => true,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high-priority" => Ok(Strategy::HighPriority),
            "standard" => Ok(Strategy::Standard),
            "comprehensive" => Ok(Strategy::Comprehensive),
            other => Err(CacheError::Validation(format!("unknown warming strategy `{other}`"))),
        }
    }
}

// == Warmup Task ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupTask {
    pub id: String,
    /// Loader-specific kind, e.g. `http`
    #[serde(rename = "type")]
    pub kind: String,
    /// What the loader fetches, e.g. a path below the loader's base URL
    pub target: String,
    #[serde(default)]
    pub params: Value,
    pub estimated_duration_ms: u64,

    // Where the loaded value is cached
    pub namespace: String,
    pub key: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub consecutive_errors: u32,
    #[serde(default)]
    pub last_run_epoch_ms: Option<u64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl WarmupTask {
    /// An HTTP task cached under `api:{target}`.
    pub fn new(id: impl Into<String>, target: impl Into<String>, estimated_duration_ms: u64) -> Self {
        let target = target.into();
        Self {
            id: id.into(),
            kind: "http".to_string(),
            key: target.clone(),
            target,
            params: Value::Null,
            estimated_duration_ms,
            namespace: "api".to_string(),
            ttl_seconds: None,
            tags: Vec::new(),
            success_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            last_run_epoch_ms: None,
            last_error: None,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn priority(&self) -> Priority {
        Priority::from_estimate(self.estimated_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CacheError::Validation("warmup task id must be non-empty".to_string()));
        }
        if self.namespace.is_empty() || self.key.is_empty() {
            return Err(CacheError::Validation(format!(
                "warmup task `{}` needs a cache namespace and key",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn record_success(&mut self, at_epoch_ms: u64) {
        self.success_count += 1;
        self.consecutive_errors = 0;
        self.last_error = None;
        self.last_run_epoch_ms = Some(at_epoch_ms);
    }

    pub(crate) fn record_failure(&mut self, at_epoch_ms: u64, error: String) {
        self.error_count += 1;
        self.consecutive_errors += 1;
        self.last_error = Some(error);
        self.last_run_epoch_ms = Some(at_epoch_ms);
    }
}
