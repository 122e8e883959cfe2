//! Cache Statistics Module
//!
//! Tracks hits, misses, store errors and read latency. Counters are atomics
//! so concurrent requests never contend on a lock; the latency average is a
//! small mutex-guarded EMA.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::lock::mutex_lock;

/// Weight of the newest latency sample in the moving average.
const LATENCY_EMA_ALPHA: f64 = 0.1;

// == Cache Stats ==
/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that returned nothing (absent, expired or store failure)
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before any read
    pub hit_rate: f64,
    /// Moving average of read latency
    pub average_response_time_ms: f64,
    /// Store round-trips that failed
    pub errors: u64,
    /// Successful writes
    pub sets: u64,
    /// Keys removed by delete and invalidation calls
    pub deletes: u64,
}

impl CacheStats {
    /// Calculates hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters behind `CacheStats`.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    latency_ema_ms: Mutex<Option<f64>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, latency: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_miss(&self, latency: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        let mut ema = mutex_lock(&self.latency_ema_ms, "stats.latency");
        *ema = Some(match *ema {
            Some(avg) => avg + LATENCY_EMA_ALPHA * (sample - avg),
            None => sample,
        });
    }

    /// Current counters.
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            hit_rate: CacheStats::compute_hit_rate(hits, misses),
            average_response_time_ms: mutex_lock(&self.latency_ema_ms, "stats.snapshot")
                .unwrap_or(0.0),
            errors: self.errors.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsRecorder::new().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::compute_hit_rate(0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = StatsRecorder::new();
        recorder.record_hit(Duration::from_millis(1));
        recorder.record_hit(Duration::from_millis(1));
        recorder.record_hit(Duration::from_millis(1));
        recorder.record_miss(Duration::from_millis(1));

        let stats = recorder.snapshot();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.75);
    }

    #[test]
    fn test_latency_moving_average() {
        let recorder = StatsRecorder::new();
        recorder.record_hit(Duration::from_millis(10));
        assert!((recorder.snapshot().average_response_time_ms - 10.0).abs() < 1e-9);

        recorder.record_miss(Duration::from_millis(20));
        // 10 + 0.1 * (20 - 10)
        assert!((recorder.snapshot().average_response_time_ms - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_set_and_delete_counters() {
        let recorder = StatsRecorder::new();
        recorder.record_error();
        recorder.record_set();
        recorder.record_set();
        recorder.record_deletes(5);

        let stats = recorder.snapshot();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.deletes, 5);
    }
}
