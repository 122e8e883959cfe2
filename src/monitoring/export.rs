//! Metrics export as JSON or CSV.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::monitoring::metrics::MetricSample;

const CSV_HEADERS: [&str; 10] = [
    "timestamp",
    "hits",
    "misses",
    "hitRate",
    "totalKeys",
    "memoryUsageBytes",
    "avgResponseTimeMs",
    "errors",
    "evictions",
    "connections",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(CacheError::Validation(format!("unknown export format '{other}'"))),
        }
    }
}

pub fn export(samples: &[MetricSample], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(samples)?),
        ExportFormat::Csv => to_csv(samples),
    }
}

/// One header row, then one row per sample. Timestamps are RFC 3339.
fn to_csv(samples: &[MetricSample]) -> Result<String> {
    let csv_err = |e: csv::Error| CacheError::Internal(format!("CSV export failed: {e}"));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADERS).map_err(csv_err)?;

    for s in samples {
        writer
            .write_record([
                crate::clock::to_rfc3339(s.timestamp_epoch_ms),
                s.hits.to_string(),
                s.misses.to_string(),
                format!("{:.4}", s.hit_rate),
                s.total_keys.to_string(),
                s.memory_usage_bytes.to_string(),
                format!("{:.3}", s.avg_response_time_ms),
                s.errors.to_string(),
                s.evictions.to_string(),
                s.connections.to_string(),
            ])
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CacheError::Internal(format!("CSV export failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CacheError::Internal(format!("CSV export produced invalid UTF-8: {e}")))
}
