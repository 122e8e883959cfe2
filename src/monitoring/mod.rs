//! Monitoring Module
//!
//! Periodic metric sampling, threshold alerts with suppression, trend
//! analysis, recommendations and metrics export.

mod alerts;
mod export;
mod metrics;
mod monitor;
mod trends;

pub use alerts::{evaluate, Alert, AlertBook, AlertType, Severity};
pub use export::{export, ExportFormat};
pub use metrics::{Metric, MetricSample, MetricsHistory};
pub use monitor::{CacheMonitor, HealthReport, HealthState};
pub use trends::{
    compute_trend, compute_trends, recommend, Recommendation, RecommendationPriority, Trend, TrendDirection,
    STABLE_BAND_PERCENT,
};
