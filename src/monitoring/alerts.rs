//! Threshold alerts with duplicate suppression.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::clock::current_timestamp_ms;
use crate::config::MonitoringSettings;
use crate::lock::mutex_lock;
use crate::monitoring::metrics::MetricSample;

/// Resolved alerts beyond this count are forgotten, oldest first.
const MAX_RETAINED_ALERTS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Hit rate below threshold
    Performance,
    Memory,
    Latency,
    Errors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub details: Value,
    pub created_at_epoch_ms: u64,
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at_epoch_ms: Option<u64>,
}

impl Alert {
    pub fn new(alert_type: AlertType, severity: Severity, message: String, details: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_type,
            severity,
            message,
            details,
            created_at_epoch_ms: current_timestamp_ms(),
            resolved: false,
            resolved_at_epoch_ms: None,
        }
    }
}

// == Threshold evaluation ==
/// Alerts a sample warrants, before suppression. `previous` is used to turn
/// the cumulative error counter into a per-interval count.
pub fn evaluate(sample: &MetricSample, previous: Option<&MetricSample>, settings: &MonitoringSettings) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if sample.has_traffic() {
        let rate = sample.hit_rate;
        let severity = if rate < settings.hit_rate_critical {
            Some(Severity::Critical)
        } else if rate < settings.hit_rate_warning {
            Some(Severity::Warning)
        } else {
            None
        };
        if let Some(severity) = severity {
            alerts.push(Alert::new(
                AlertType::Performance,
                severity,
                format!("Cache hit rate is {:.1}%", rate * 100.0),
                json!({
                    "hitRate": rate,
                    "warningThreshold": settings.hit_rate_warning,
                    "criticalThreshold": settings.hit_rate_critical,
                }),
            ));
        }
    }

    if settings.max_memory_bytes > 0 {
        let ratio = sample.memory_usage_bytes as f64 / settings.max_memory_bytes as f64;
        let severity = if ratio >= settings.memory_critical {
            Some(Severity::Critical)
        } else if ratio >= settings.memory_warning {
            Some(Severity::Warning)
        } else {
            None
        };
        if let Some(severity) = severity {
            alerts.push(Alert::new(
                AlertType::Memory,
                severity,
                format!("Cache memory usage is {:.1}% of budget", ratio * 100.0),
                json!({
                    "memoryUsageBytes": sample.memory_usage_bytes,
                    "maxMemoryBytes": settings.max_memory_bytes,
                    "usageRatio": ratio,
                }),
            ));
        }
    }

    let latency = sample.avg_response_time_ms;
    let severity = if latency >= settings.response_time_critical_ms {
        Some(Severity::Critical)
    } else if latency >= settings.response_time_warning_ms {
        Some(Severity::Warning)
    } else {
        None
    };
    if let Some(severity) = severity {
        alerts.push(Alert::new(
            AlertType::Latency,
            severity,
            format!("Average cache response time is {latency:.1}ms"),
            json!({
                "avgResponseTimeMs": latency,
                "warningThresholdMs": settings.response_time_warning_ms,
                "criticalThresholdMs": settings.response_time_critical_ms,
            }),
        ));
    }

    let new_errors = sample.errors.saturating_sub(previous.map_or(0, |p| p.errors));
    if settings.error_warning > 0 && new_errors >= settings.error_warning {
        alerts.push(Alert::new(
            AlertType::Errors,
            Severity::Warning,
            format!("{new_errors} cache store errors since the last sample"),
            json!({ "newErrors": new_errors, "threshold": settings.error_warning }),
        ));
    }

    alerts
}

// == Alert Book ==
/// Every alert raised, with suppression of repeats.
#[derive(Debug)]
pub struct AlertBook {
    alerts: Mutex<Vec<Alert>>,
    suppression_ms: u64,
}

impl AlertBook {
    pub fn new(suppression_ms: u64) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            suppression_ms,
        }
    }

    /// Stores `alert` unless an unresolved alert of the same type was raised
    /// within the suppression window. Returns the stored alert. At most
    /// `MAX_RETAINED_ALERTS` are kept, resolved or not.
    pub fn raise(&self, alert: Alert) -> Option<Alert> {
        let mut alerts = mutex_lock(&self.alerts, "alerts.raise");
        let window_start = alert.created_at_epoch_ms.saturating_sub(self.suppression_ms);
        let duplicate = alerts.iter().any(|existing| {
            !existing.resolved
                && existing.alert_type == alert.alert_type
                && existing.created_at_epoch_ms >= window_start
        });
        if duplicate {
            return None;
        }

        alerts.push(alert.clone());
        while alerts.len() > MAX_RETAINED_ALERTS {
            // Oldest resolved alert first, else the oldest of all.
            let pos = alerts.iter().position(|a| a.resolved).unwrap_or(0);
            alerts.remove(pos);
        }
        Some(alert)
    }

    /// Unresolved alerts, newest first.
    pub fn active(&self) -> Vec<Alert> {
        mutex_lock(&self.alerts, "alerts.active")
            .iter()
            .rev()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// All retained alerts, newest first.
    pub fn all(&self, limit: usize) -> Vec<Alert> {
        mutex_lock(&self.alerts, "alerts.all")
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Marks an alert resolved. False if unknown or already resolved.
    pub fn resolve(&self, id: &str) -> bool {
        let mut alerts = mutex_lock(&self.alerts, "alerts.resolve");
        match alerts.iter_mut().find(|a| a.id == id && !a.resolved) {
            Some(alert) => {
                alert.resolved = true;
                alert.resolved_at_epoch_ms = Some(current_timestamp_ms());
                true
            }
            None => false,
        }
    }
}
