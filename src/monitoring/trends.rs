//! Trend detection over the metrics history and the advice derived from it.

use serde::Serialize;

use crate::config::MonitoringSettings;
use crate::monitoring::metrics::{Metric, MetricSample};

/// Relative change, in percent, below which a metric counts as stable.
pub const STABLE_BAND_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub metric: String,
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub first: f64,
    pub last: f64,
    pub samples: usize,
}

/// Compares the first and last sample. `None` with fewer than two samples.
pub fn compute_trend(samples: &[MetricSample], metric: Metric) -> Option<Trend> {
    let (first, last) = match samples {
        [first, .., last] => (first.value(metric), last.value(metric)),
        _ => return None,
    };

    let change_percent = if first == 0.0 {
        if last == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (last - first) / first.abs() * 100.0
    };

    let direction = if change_percent > STABLE_BAND_PERCENT {
        TrendDirection::Increasing
    } else if change_percent < -STABLE_BAND_PERCENT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    Some(Trend {
        metric: metric.to_string(),
        direction,
        change_percent,
        first,
        last,
        samples: samples.len(),
    })
}

pub fn compute_trends(samples: &[MetricSample]) -> Vec<Trend> {
    Metric::ALL
        .iter()
        .filter_map(|metric| compute_trend(samples, *metric))
        .collect()
}

// == Recommendations ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub category: String,
    pub priority: RecommendationPriority,
    pub message: String,
}

impl Recommendation {
    fn new(category: &str, priority: RecommendationPriority, message: String) -> Self {
        Self {
            category: category.to_string(),
            priority,
            message,
        }
    }
}

fn trend_of<'a>(trends: &'a [Trend], metric: Metric) -> Option<&'a Trend> {
    let name = metric.to_string();
    trends.iter().find(|t| t.metric == name)
}

/// Advice for the latest sample and recent trends, most urgent first.
pub fn recommend(
    latest: Option<&MetricSample>,
    trends: &[Trend],
    settings: &MonitoringSettings,
) -> Vec<Recommendation> {
    use RecommendationPriority::{High, Low, Medium};

    let mut out = Vec::new();

    if let Some(sample) = latest {
        if sample.has_traffic() && sample.hit_rate < settings.hit_rate_warning {
            let priority = if sample.hit_rate < settings.hit_rate_critical { High } else { Medium };
            out.push(Recommendation::new(
                "performance",
                priority,
                format!(
                    "Hit rate is {:.1}%: review TTLs for frequently read data and add warmup tasks for hot endpoints",
                    sample.hit_rate * 100.0
                ),
            ));
        }

        if settings.max_memory_bytes > 0 {
            let ratio = sample.memory_usage_bytes as f64 / settings.max_memory_bytes as f64;
            if ratio >= settings.memory_warning {
                let priority = if ratio >= settings.memory_critical { High } else { Medium };
                out.push(Recommendation::new(
                    "memory",
                    priority,
                    format!(
                        "Memory usage is {:.1}% of budget: lower TTLs for large entries or raise the entry limit",
                        ratio * 100.0
                    ),
                ));
            }
        }

        if sample.avg_response_time_ms >= settings.response_time_warning_ms {
            out.push(Recommendation::new(
                "latency",
                Medium,
                format!(
                    "Average response time is {:.1}ms: check store connectivity and value sizes",
                    sample.avg_response_time_ms
                ),
            ));
        }
    }

    if trend_of(trends, Metric::HitRate).is_some_and(|t| t.direction == TrendDirection::Decreasing) {
        out.push(Recommendation::new(
            "performance",
            Low,
            "Hit rate is falling: check recently added invalidation rules for over-broad targets".to_string(),
        ));
    }
    if trend_of(trends, Metric::MemoryUsage).is_some_and(|t| t.direction == TrendDirection::Increasing) {
        out.push(Recommendation::new(
            "memory",
            Low,
            "Memory usage is rising: confirm eviction keeps pace with writes".to_string(),
        ));
    }
    if trend_of(trends, Metric::Errors).is_some_and(|t| t.direction == TrendDirection::Increasing) {
        out.push(Recommendation::new(
            "errors",
            Medium,
            "Store errors are increasing: inspect store health and timeouts".to_string(),
        ));
    }

    out.sort_by_key(|r| r.priority);
    out
}
