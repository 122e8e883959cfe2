//! Configuration Module
//!
//! Loads engine configuration from environment variables. Every value has a
//! default; `Config::default()` and `Config::from_env()` with an empty
//! environment are identical.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Reads `name` from the environment, falling back to `default` when unset
/// or unparsable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// == Cache Core ==
/// Cache Core parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// First segment of every entry key (`{prefix}:{namespace}:{key}`)
    pub key_prefix: String,
    /// TTL in seconds for entries written without one
    pub default_ttl: u64,
    /// Longest natural key kept verbatim; longer keys are hashed
    pub max_key_length: usize,
    /// Largest serialized value accepted, in bytes
    pub max_value_size: usize,
    /// Deadline for a single store round-trip
    pub store_timeout_ms: u64,
    /// Keys requested per SCAN page during pattern invalidation
    pub scan_batch: usize,
    /// Capacity of the in-process store
    pub max_entries: usize,
    /// Publish a message on every bulk invalidation
    pub broadcast_invalidations: bool,
}

impl CacheSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    fn from_env() -> Self {
        let d = Self::default();
        Self {
            key_prefix: env_opt("CACHE_KEY_PREFIX").unwrap_or(d.key_prefix),
            default_ttl: env_or("DEFAULT_TTL", d.default_ttl),
            max_key_length: env_or("MAX_KEY_LENGTH", d.max_key_length),
            max_value_size: env_or("MAX_VALUE_SIZE", d.max_value_size),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", d.store_timeout_ms),
            scan_batch: env_or("SCAN_BATCH", d.scan_batch),
            max_entries: env_or("MAX_ENTRIES", d.max_entries),
            broadcast_invalidations: env_or("BROADCAST_INVALIDATIONS", d.broadcast_invalidations),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            key_prefix: "cache".to_string(),
            default_ttl: 300,
            max_key_length: 200,
            max_value_size: 1024 * 1024,
            store_timeout_ms: 2_000,
            scan_batch: 100,
            max_entries: 10_000,
            broadcast_invalidations: true,
        }
    }
}

// == Sessions ==
/// Session Store parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Minimum lifetime of a session, in seconds
    pub default_ttl: u64,
    /// Inactivity after which a session is treated as expired
    pub max_idle_seconds: u64,
    /// Refresh activity time and TTL on every successful read
    pub sliding_expiration: bool,
    /// Extra lifetime given to the per-user index beyond the session TTL
    pub index_ttl_margin: u64,
}

impl SessionSettings {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_ttl: env_or("SESSION_TTL", d.default_ttl),
            max_idle_seconds: env_or("SESSION_MAX_IDLE", d.max_idle_seconds),
            sliding_expiration: env_or("SESSION_SLIDING_EXPIRATION", d.sliding_expiration),
            index_ttl_margin: env_or("SESSION_INDEX_TTL_MARGIN", d.index_ttl_margin),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_ttl: 86_400,
            max_idle_seconds: 1_800,
            sliding_expiration: true,
            index_ttl_margin: 300,
        }
    }
}

// == Invalidation ==
/// Invalidation Engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidationSettings {
    /// Most recent invalidation events retained
    pub history_limit: usize,
    /// Debounce window applied to rules that do not declare one (0 = off)
    pub default_debounce_ms: u64,
    /// Pub/sub channel carrying store-change notifications
    pub events_channel: String,
}

impl InvalidationSettings {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            history_limit: env_or("INVALIDATION_HISTORY_LIMIT", d.history_limit),
            default_debounce_ms: env_or("INVALIDATION_DEBOUNCE_MS", d.default_debounce_ms),
            events_channel: env_opt("INVALIDATION_EVENTS_CHANNEL").unwrap_or(d.events_channel),
        }
    }
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            history_limit: 100,
            default_debounce_ms: 0,
            events_channel: "cache:events".to_string(),
        }
    }
}

// == Warming ==
/// Warming Scheduler parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WarmingSettings {
    /// Deadline for loading a single task
    pub task_timeout_ms: u64,
    /// Consecutive failures after which a task is skipped by filtered strategies
    pub error_threshold: u32,
    /// Seconds between high-priority passes
    pub high_priority_interval: u64,
    /// Seconds between standard passes
    pub standard_interval: u64,
    /// Seconds between comprehensive passes
    pub comprehensive_interval: u64,
    /// Base URL for the HTTP loader; warming schedules stay idle without it
    pub base_url: Option<String>,
}

impl WarmingSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    fn from_env() -> Self {
        let d = Self::default();
        Self {
            task_timeout_ms: env_or("WARMING_TASK_TIMEOUT_MS", d.task_timeout_ms),
            error_threshold: env_or("WARMING_ERROR_THRESHOLD", d.error_threshold),
            high_priority_interval: env_or("WARMING_HIGH_INTERVAL", d.high_priority_interval),
            standard_interval: env_or("WARMING_STANDARD_INTERVAL", d.standard_interval),
            comprehensive_interval: env_or("WARMING_COMPREHENSIVE_INTERVAL", d.comprehensive_interval),
            base_url: env_opt("WARMING_BASE_URL"),
        }
    }
}

impl Default for WarmingSettings {
    fn default() -> Self {
        Self {
            task_timeout_ms: 10_000,
            error_threshold: 3,
            high_priority_interval: 300,
            standard_interval: 1_800,
            comprehensive_interval: 86_400,
            base_url: None,
        }
    }
}

// == Monitoring ==
/// Monitoring Loop parameters and alert thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringSettings {
    /// Seconds between metric collections
    pub interval_secs: u64,
    /// Hours of samples kept in the rolling history
    pub retention_hours: u64,
    /// Memory budget the usage thresholds are measured against
    pub max_memory_bytes: u64,
    /// Window in which an unresolved alert of the same type is not repeated
    pub alert_suppression_secs: u64,
    pub hit_rate_warning: f64,
    pub hit_rate_critical: f64,
    pub memory_warning: f64,
    pub memory_critical: f64,
    pub response_time_warning_ms: f64,
    pub response_time_critical_ms: f64,
    /// Store errors per collection interval that raise an alert
    pub error_warning: u64,
}

impl MonitoringSettings {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            interval_secs: env_or("MONITORING_INTERVAL", d.interval_secs),
            retention_hours: env_or("MONITORING_RETENTION_HOURS", d.retention_hours),
            max_memory_bytes: env_or("MONITORING_MAX_MEMORY_BYTES", d.max_memory_bytes),
            alert_suppression_secs: env_or("ALERT_SUPPRESSION_SECS", d.alert_suppression_secs),
            hit_rate_warning: env_or("ALERT_HIT_RATE_WARNING", d.hit_rate_warning),
            hit_rate_critical: env_or("ALERT_HIT_RATE_CRITICAL", d.hit_rate_critical),
            memory_warning: env_or("ALERT_MEMORY_WARNING", d.memory_warning),
            memory_critical: env_or("ALERT_MEMORY_CRITICAL", d.memory_critical),
            response_time_warning_ms: env_or("ALERT_RESPONSE_WARNING_MS", d.response_time_warning_ms),
            response_time_critical_ms: env_or("ALERT_RESPONSE_CRITICAL_MS", d.response_time_critical_ms),
            error_warning: env_or("ALERT_ERROR_WARNING", d.error_warning),
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            retention_hours: 24,
            max_memory_bytes: 256 * 1024 * 1024,
            alert_suppression_secs: 300,
            hit_rate_warning: 0.8,
            hit_rate_critical: 0.7,
            memory_warning: 0.8,
            memory_critical: 0.9,
            response_time_warning_ms: 100.0,
            response_time_critical_ms: 500.0,
            error_warning: 10,
        }
    }
}

// == Engine Config ==
/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP admin API port
    pub server_port: u16,
    /// Seconds between sweeps of expired entries in the in-process store
    pub cleanup_interval: u64,
    pub cache: CacheSettings,
    pub session: SessionSettings,
    pub invalidation: InvalidationSettings,
    pub warming: WarmingSettings,
    pub monitoring: MonitoringSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 1,
            cache: CacheSettings::default(),
            session: SessionSettings::default(),
            invalidation: InvalidationSettings::default(),
            warming: WarmingSettings::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP admin port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Expired-entry sweep frequency in seconds (default: 1)
    /// - `CACHE_KEY_PREFIX`, `DEFAULT_TTL`, `MAX_KEY_LENGTH`, `MAX_VALUE_SIZE`,
    ///   `STORE_TIMEOUT_MS`, `SCAN_BATCH`, `MAX_ENTRIES`, `BROADCAST_INVALIDATIONS`
    /// - `SESSION_TTL`, `SESSION_MAX_IDLE`, `SESSION_SLIDING_EXPIRATION`,
    ///   `SESSION_INDEX_TTL_MARGIN`
    /// - `INVALIDATION_HISTORY_LIMIT`, `INVALIDATION_DEBOUNCE_MS`,
    ///   `INVALIDATION_EVENTS_CHANNEL`
    /// - `WARMING_*` and `MONITORING_*` / `ALERT_*` for the background loops
    pub fn from_env() -> Self {
        Self {
            server_port: env_or("SERVER_PORT", 3000),
            cleanup_interval: env_or("CLEANUP_INTERVAL", 1),
            cache: CacheSettings::from_env(),
            session: SessionSettings::from_env(),
            invalidation: InvalidationSettings::from_env(),
            warming: WarmingSettings::from_env(),
            monitoring: MonitoringSettings::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.key_prefix, "cache");
        assert_eq!(config.cache.default_ttl, 300);
        assert_eq!(config.session.max_idle_seconds, 1_800);
        assert_eq!(config.invalidation.history_limit, 100);
        assert_eq!(config.warming.error_threshold, 3);
        assert_eq!(config.monitoring.hit_rate_critical, 0.7);
        assert_eq!(config.monitoring.alert_suppression_secs, 300);
    }

    #[test]
    fn test_config_from_env_defaults() {
        for var in ["SERVER_PORT", "CLEANUP_INTERVAL", "DEFAULT_TTL", "CACHE_KEY_PREFIX", "SESSION_TTL"] {
            env::remove_var(var);
        }

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.session.default_ttl, 86_400);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        env::set_var("SCAN_BATCH", "lots");
        assert_eq!(CacheSettings::from_env().scan_batch, 100);
        env::remove_var("SCAN_BATCH");
    }

    #[test]
    fn test_durations() {
        let cache = CacheSettings::default();
        assert_eq!(cache.store_timeout(), Duration::from_secs(2));
        assert_eq!(WarmingSettings::default().task_timeout(), Duration::from_secs(10));
    }
}
