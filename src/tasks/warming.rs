//! Recurring warmup schedules, one loop per strategy.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::warming::{Strategy, WarmingScheduler};

/// Spawns the high-priority, standard and comprehensive loops. A strategy
/// with a zero interval is not scheduled.
pub fn spawn_warming_schedules(scheduler: Arc<WarmingScheduler>) -> Vec<JoinHandle<()>> {
    let settings = scheduler.settings().clone();
    [
        (Strategy::HighPriority, settings.high_priority_interval),
        (Strategy::Standard, settings.standard_interval),
        (Strategy::Comprehensive, settings.comprehensive_interval),
    ]
    .into_iter()
    .filter(|(_, secs)| *secs > 0)
    .map(|(strategy, secs)| spawn_schedule(scheduler.clone(), strategy, Duration::from_secs(secs)))
    .collect()
}

fn spawn_schedule(scheduler: Arc<WarmingScheduler>, strategy: Strategy, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(%strategy, interval_secs = every.as_secs(), "Starting warmup schedule");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = scheduler.execute_strategy(strategy).await;
            info!(
                %strategy,
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "Scheduled warmup finished"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheCore;
    use crate::config::{CacheSettings, WarmingSettings};
    use crate::error::Result;
    use crate::store::MemoryStore;
    use crate::warming::{WarmupLoader, WarmupTask};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoLoader;

    #[async_trait]
    impl WarmupLoader for EchoLoader {
        async fn load(&self, task: &WarmupTask) -> Result<Value> {
            Ok(json!({ "target": task.target }))
        }
    }

    #[tokio::test]
    async fn test_zero_intervals_are_skipped() {
        let cache = Arc::new(CacheCore::new(Arc::new(MemoryStore::new(10)), CacheSettings::default()));
        let settings = WarmingSettings {
            high_priority_interval: 60,
            standard_interval: 0,
            comprehensive_interval: 0,
            ..WarmingSettings::default()
        };
        let scheduler = Arc::new(WarmingScheduler::new(cache.clone(), Arc::new(EchoLoader), settings));
        scheduler.register_task(WarmupTask::new("home", "/home", 100));

        let handles = spawn_warming_schedules(scheduler);
        assert_eq!(handles.len(), 1);

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let cached: Option<Value> = cache.get("api", "/home").await;
        assert_eq!(cached, Some(json!({ "target": "/home" })));

        for handle in handles {
            handle.abort();
        }
    }
}
