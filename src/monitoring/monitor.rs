//! The cache monitor: periodic samples, alerts, trends and exports.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cache::CacheCore;
use crate::clock::current_timestamp_ms;
use crate::config::MonitoringSettings;
use crate::error::Result;
use crate::monitoring::alerts::{evaluate, Alert, AlertBook, Severity};
use crate::monitoring::export::{export, ExportFormat};
use crate::monitoring::metrics::{MetricSample, MetricsHistory};
use crate::monitoring::trends::{compute_trends, recommend, Recommendation, Trend};

const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthState,
    pub store_reachable: bool,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub timestamp: String,
}

pub struct CacheMonitor {
    cache: Arc<CacheCore>,
    settings: MonitoringSettings,
    history: MetricsHistory,
    alerts: AlertBook,
}

impl CacheMonitor {
    pub fn new(cache: Arc<CacheCore>, settings: MonitoringSettings) -> Self {
        let retention_ms = settings.retention_hours.saturating_mul(MS_PER_HOUR);
        let suppression_ms = settings.alert_suppression_secs.saturating_mul(1000);
        Self {
            cache,
            settings,
            history: MetricsHistory::new(retention_ms),
            alerts: AlertBook::new(suppression_ms),
        }
    }

    pub fn settings(&self) -> &MonitoringSettings {
        &self.settings
    }

    /// A fresh sample built from the cache counters and store info. Not
    /// recorded in the history.
    pub async fn get_current_metrics(&self) -> MetricSample {
        let stats = self.cache.stats();
        let info = match self.cache.store().info().await {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "Store info unavailable, reporting zeroes");
                Default::default()
            }
        };

        MetricSample {
            timestamp_epoch_ms: current_timestamp_ms(),
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate,
            total_keys: info.total_keys,
            memory_usage_bytes: info.used_memory_bytes,
            avg_response_time_ms: stats.average_response_time_ms,
            errors: stats.errors,
            evictions: info.evicted_keys,
            connections: info.connected_clients,
        }
    }

    /// One monitoring cycle: sample, record, evaluate. Returns the alerts
    /// that were raised (suppressed duplicates excluded).
    pub async fn collect_metrics(&self) -> Vec<Alert> {
        let sample = self.get_current_metrics().await;
        self.record_sample(sample)
    }

    /// Records an externally built sample and evaluates thresholds on it.
    pub fn record_sample(&self, sample: MetricSample) -> Vec<Alert> {
        let previous = self.history.latest();
        let candidates = evaluate(&sample, previous.as_ref(), &self.settings);
        self.history.push(sample);

        let raised: Vec<Alert> = candidates
            .into_iter()
            .filter_map(|alert| self.alerts.raise(alert))
            .collect();
        for alert in &raised {
            match alert.severity {
                Severity::Critical => error!(alert_type = ?alert.alert_type, message = %alert.message, "Cache alert"),
                Severity::Warning => warn!(alert_type = ?alert.alert_type, message = %alert.message, "Cache alert"),
            }
        }
        debug!(samples = self.history.len(), raised = raised.len(), "Metrics recorded");
        raised
    }

    pub fn latest_sample(&self) -> Option<MetricSample> {
        self.history.latest()
    }

    pub fn get_metrics_history(&self, hours: u64) -> Vec<MetricSample> {
        let from = current_timestamp_ms().saturating_sub(hours.saturating_mul(MS_PER_HOUR));
        self.history.since(from)
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts.active()
    }

    pub fn alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts.all(limit)
    }

    pub fn resolve_alert(&self, id: &str) -> bool {
        self.alerts.resolve(id)
    }

    pub fn get_trends(&self, period_hours: u64) -> Vec<Trend> {
        compute_trends(&self.get_metrics_history(period_hours))
    }

    /// Advice from the latest sample and the past hour's trends.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let trends = self.get_trends(1);
        recommend(self.history.latest().as_ref(), &trends, &self.settings)
    }

    pub fn export_metrics(&self, from_ms: u64, to_ms: u64, format: ExportFormat) -> Result<String> {
        export(&self.history.range(from_ms, to_ms), format)
    }

    pub async fn health(&self) -> HealthReport {
        let store_reachable = self.cache.store().ping().await.is_ok();
        let active = self.alerts.active();
        let critical = active.iter().filter(|a| a.severity == Severity::Critical).count();

        let status = if !store_reachable {
            HealthState::Unhealthy
        } else if critical > 0 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            status,
            store_reachable,
            active_alerts: active.len(),
            critical_alerts: critical,
            timestamp: crate::clock::to_rfc3339(current_timestamp_ms()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::monitoring::alerts::AlertType;
    use crate::store::MemoryStore;

    fn monitor() -> (Arc<CacheCore>, CacheMonitor) {
        let store = Arc::new(MemoryStore::new(1_000));
        let cache = Arc::new(CacheCore::new(store, CacheSettings::default()));
        let monitor = CacheMonitor::new(cache.clone(), MonitoringSettings::default());
        (cache, monitor)
    }

    fn synthetic(hit_rate: f64) -> MetricSample {
        let hits = (hit_rate * 100.0).round() as u64;
        MetricSample {
            timestamp_epoch_ms: current_timestamp_ms(),
            hits,
            misses: 100 - hits,
            hit_rate,
            avg_response_time_ms: 2.0,
            ..MetricSample::default()
        }
    }

    #[tokio::test]
    async fn test_low_hit_rate_raises_one_critical_alert() {
        let (_, monitor) = monitor();

        let raised = monitor.record_sample(synthetic(0.6));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::Performance);
        assert_eq!(raised[0].severity, Severity::Critical);

        assert!(monitor.record_sample(synthetic(0.6)).is_empty());
        let active = monitor.get_active_alerts();
        assert_eq!(active.len(), 1);
        assert!(!active[0].resolved);
    }

    #[tokio::test]
    async fn test_resolve_then_realert() {
        let (_, monitor) = monitor();
        let id = monitor.record_sample(synthetic(0.6))[0].id.clone();

        assert!(monitor.resolve_alert(&id));
        assert!(monitor.get_active_alerts().is_empty());
        assert_eq!(monitor.record_sample(synthetic(0.6)).len(), 1);
        assert_eq!(monitor.alerts(10).len(), 2);
    }

    #[tokio::test]
    async fn test_collect_metrics_reads_cache_and_store() {
        let (cache, monitor) = monitor();
        assert!(cache.set("ns", "a", &1, None, &[]).await);
        assert!(cache.set("ns", "b", &2, None, &[]).await);
        let _: Option<i32> = cache.get("ns", "a").await;
        let _: Option<i32> = cache.get("ns", "missing").await;

        monitor.collect_metrics().await;
        let sample = monitor.latest_sample().unwrap();
        assert_eq!(sample.hits, 1);
        assert_eq!(sample.misses, 1);
        assert_eq!(sample.hit_rate, 0.5);
        assert!(sample.total_keys >= 2);
        assert!(sample.memory_usage_bytes > 0);
        assert_eq!(monitor.get_metrics_history(1).len(), 1);
    }

    #[tokio::test]
    async fn test_trends_and_recommendations() {
        let (_, monitor) = monitor();
        monitor.record_sample(synthetic(0.95));
        monitor.record_sample(synthetic(0.6));

        let trends = monitor.get_trends(1);
        let hit = trends.iter().find(|t| t.metric == "hitRate").unwrap();
        assert_eq!(hit.direction, crate::monitoring::TrendDirection::Decreasing);

        let recs = monitor.recommendations();
        assert!(recs.iter().any(|r| r.category == "performance"));
    }

    #[tokio::test]
    async fn test_export_window() {
        let (_, monitor) = monitor();
        let mut early = synthetic(0.9);
        early.timestamp_epoch_ms -= 10_000;
        let early_ts = early.timestamp_epoch_ms;
        monitor.record_sample(early);
        monitor.record_sample(synthetic(0.9));

        let csv = monitor
            .export_metrics(early_ts + 1, u64::MAX, ExportFormat::Csv)
            .unwrap();
        assert_eq!(csv.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_health_degrades_on_critical_alert() {
        let (_, monitor) = monitor();
        assert_eq!(monitor.health().await.status, HealthState::Healthy);

        monitor.record_sample(synthetic(0.5));
        let report = monitor.health().await;
        assert_eq!(report.status, HealthState::Degraded);
        assert_eq!(report.critical_alerts, 1);
        assert!(report.store_reachable);
    }
}
