//! Metric samples and their rolling history.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::lock::mutex_lock;

// == Metric Sample ==
/// One snapshot of cache health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub timestamp_epoch_ms: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_keys: u64,
    pub memory_usage_bytes: u64,
    pub avg_response_time_ms: f64,
    /// Cumulative store errors seen by the cache core
    pub errors: u64,
    pub evictions: u64,
    pub connections: u64,
}

impl MetricSample {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::HitRate => self.hit_rate,
            Metric::MemoryUsage => self.memory_usage_bytes as f64,
            Metric::ResponseTime => self.avg_response_time_ms,
            Metric::Errors => self.errors as f64,
            Metric::TotalKeys => self.total_keys as f64,
        }
    }

    /// Whether any reads have happened, i.e. whether the hit rate means anything.
    pub fn has_traffic(&self) -> bool {
        self.hits + self.misses > 0
    }
}

/// Metrics that trends are computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    HitRate,
    MemoryUsage,
    ResponseTime,
    Errors,
    TotalKeys,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::HitRate,
        Metric::MemoryUsage,
        Metric::ResponseTime,
        Metric::Errors,
        Metric::TotalKeys,
    ];
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::HitRate => "hitRate",
            Metric::MemoryUsage => "memoryUsage",
            Metric::ResponseTime => "responseTime",
            Metric::Errors => "errors",
            Metric::TotalKeys => "totalKeys",
        };
        f.write_str(name)
    }
}

// == Metrics History ==
/// Samples within the retention window, oldest first.
#[derive(Debug)]
pub struct MetricsHistory {
    samples: Mutex<VecDeque<MetricSample>>,
    retention_ms: u64,
}

impl MetricsHistory {
    pub fn new(retention_ms: u64) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            retention_ms,
        }
    }

    /// Appends a sample and drops everything older than the retention
    /// window measured from it.
    pub fn push(&self, sample: MetricSample) {
        let cutoff = sample.timestamp_epoch_ms.saturating_sub(self.retention_ms);
        let mut samples = mutex_lock(&self.samples, "metrics.push");
        samples.push_back(sample);
        while samples
            .front()
            .is_some_and(|oldest| oldest.timestamp_epoch_ms < cutoff)
        {
            samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<MetricSample> {
        mutex_lock(&self.samples, "metrics.latest").back().cloned()
    }

    /// Samples with `from_ms <= timestamp <= to_ms`, oldest first.
    pub fn range(&self, from_ms: u64, to_ms: u64) -> Vec<MetricSample> {
        mutex_lock(&self.samples, "metrics.range")
            .iter()
            .filter(|s| (from_ms..=to_ms).contains(&s.timestamp_epoch_ms))
            .cloned()
            .collect()
    }

    pub fn since(&self, from_ms: u64) -> Vec<MetricSample> {
        self.range(from_ms, u64::MAX)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.samples, "metrics.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
