//! Periodic metrics collection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::monitoring::CacheMonitor;

/// Runs one monitoring cycle every `interval_secs` seconds.
pub fn spawn_monitoring_task(monitor: Arc<CacheMonitor>) -> JoinHandle<()> {
    let interval = Duration::from_secs(monitor.settings().interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Starting metrics collection task");

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            monitor.collect_metrics().await;
        }
    })
}
