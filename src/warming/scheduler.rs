//! Warming Scheduler
//!
//! Registry of warmup tasks executed by strategy. Within a run the high band
//! goes first and concurrently, then the medium band concurrently, then the
//! low band one task at a time. Every task is fault isolated: a failure only
//! touches that task's counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheCore;
use crate::clock::current_timestamp_ms;
use crate::config::WarmingSettings;
use crate::error::{CacheError, Result};
use crate::lock::{rw_read, rw_write};
use crate::warming::loader::WarmupLoader;
use crate::warming::task::{Priority, Strategy, WarmupTask};

/// Name of the persisted task document.
const TASKS_DOCUMENT: &str = "warmup-tasks";

/// Outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub priority: Priority,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
    pub strategy: Strategy,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Registered tasks the strategy left out
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TaskResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmingStats {
    pub tasks: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub runs: u64,
    pub successes: u64,
    pub errors: u64,
}

// == Warming Scheduler ==
pub struct WarmingScheduler {
    cache: Arc<CacheCore>,
    loader: Arc<dyn WarmupLoader>,
    settings: WarmingSettings,
    tasks: RwLock<BTreeMap<String, WarmupTask>>,
    runs: AtomicU64,
}

impl WarmingScheduler {
    pub fn new(cache: Arc<CacheCore>, loader: Arc<dyn WarmupLoader>, settings: WarmingSettings) -> Self {
        Self {
            cache,
            loader,
            settings,
            tasks: RwLock::new(BTreeMap::new()),
            runs: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &WarmingSettings {
        &self.settings
    }

    // == Task Registry ==
    /// Adds or replaces a task.
    pub fn register_task(&self, task: WarmupTask) -> bool {
        if let Err(err) = task.validate() {
            warn!(task_id = %task.id, error = %err, "Rejected warmup task");
            return false;
        }
        debug!(task_id = %task.id, priority = ?task.priority(), "Warmup task registered");
        rw_write(&self.tasks, "warming.register").insert(task.id.clone(), task);
        true
    }

    pub fn remove_task(&self, task_id: &str) -> bool {
        rw_write(&self.tasks, "warming.remove").remove(task_id).is_some()
    }

    pub fn task(&self, task_id: &str) -> Option<WarmupTask> {
        rw_read(&self.tasks, "warming.task").get(task_id).cloned()
    }

    pub fn tasks(&self) -> Vec<WarmupTask> {
        rw_read(&self.tasks, "warming.tasks").values().cloned().collect()
    }

    pub async fn save_tasks(&self) -> bool {
        let tasks = self.tasks();
        self.cache.save_document(TASKS_DOCUMENT, &tasks).await
    }

    /// Restores persisted tasks, counters included.
    pub async fn load_tasks(&self) -> usize {
        let Some(tasks) = self
            .cache
            .load_document::<Vec<WarmupTask>>(TASKS_DOCUMENT)
            .await
        else {
            return 0;
        };
        tasks.into_iter().filter(|task| self.register_task(task.clone())).count()
    }

    // == Execute Strategy ==
    /// Runs every task the strategy selects, band by band.
    pub async fn execute_strategy(&self, strategy: Strategy) -> WarmupReport {
        let started = Instant::now();
        let all = self.tasks();
        let threshold = self.settings.error_threshold;
        let (selected, skipped): (Vec<WarmupTask>, Vec<WarmupTask>) =
            all.into_iter().partition(|task| strategy.includes(task, threshold));

        let mut bands: BTreeMap<Priority, Vec<WarmupTask>> = BTreeMap::new();
        for task in selected {
            bands.entry(task.priority()).or_default().push(task);
        }

        info!(
            strategy = %strategy,
            high = bands.get(&Priority::High).map_or(0, Vec::len),
            medium = bands.get(&Priority::Medium).map_or(0, Vec::len),
            low = bands.get(&Priority::Low).map_or(0, Vec::len),
            "Warming started"
        );

        let mut results = Vec::new();
        for (priority, tasks) in bands {
            match priority {
                Priority::High | Priority::Medium => {
                    results.extend(join_all(tasks.iter().map(|task| self.run_task(task))).await);
                }
                Priority::Low => {
                    for task in &tasks {
                        results.push(self.run_task(task).await);
                    }
                }
            }
        }

        self.runs.fetch_add(1, Ordering::Relaxed);
        let succeeded = results.iter().filter(|r| r.success).count();
        let report = WarmupReport {
            strategy,
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            skipped: skipped.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            results,
        };
        info!(
            strategy = %strategy,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Warming finished"
        );
        report
    }

    /// Runs one task right away, whatever its health.
    pub async fn warm_now(&self, task_id: &str) -> Option<TaskResult> {
        let task = self.task(task_id)?;
        Some(self.run_task(&task).await)
    }

    pub fn stats(&self) -> WarmingStats {
        let tasks = rw_read(&self.tasks, "warming.stats");
        let mut stats = WarmingStats {
            tasks: tasks.len(),
            runs: self.runs.load(Ordering::Relaxed),
            ..WarmingStats::default()
        };
        for task in tasks.values() {
            match task.priority() {
                Priority::High => stats.high += 1,
                Priority::Medium => stats.medium += 1,
                Priority::Low => stats.low += 1,
            }
            stats.successes += task.success_count;
            stats.errors += task.error_count;
        }
        stats
    }

    // == Task Execution ==
    async fn run_task(&self, task: &WarmupTask) -> TaskResult {
        let started = Instant::now();
        let outcome = self.load_and_store(task).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let now = current_timestamp_ms();

        // Write back into the registry; a task removed mid-run stays removed.
        if let Some(stored) = rw_write(&self.tasks, "warming.outcome").get_mut(&task.id) {
            match &outcome {
                Ok(()) => stored.record_success(now),
                Err(err) => stored.record_failure(now, err.to_string()),
            }
        }

        match outcome {
            Ok(()) => {
                debug!(task_id = %task.id, duration_ms, "Warmup task succeeded");
                TaskResult {
                    task_id: task.id.clone(),
                    priority: task.priority(),
                    success: true,
                    duration_ms,
                    error: None,
                }
            }
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "Warmup task failed");
                TaskResult {
                    task_id: task.id.clone(),
                    priority: task.priority(),
                    success: false,
                    duration_ms,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn load_and_store(&self, task: &WarmupTask) -> Result<()> {
        let timeout = self.settings.task_timeout();
        let value = tokio::time::timeout(timeout, self.loader.load(task))
            .await
            .map_err(|_| CacheError::Loader(format!("timed out after {timeout:?}")))??;

        let stored = self
            .cache
            .set(&task.namespace, &task.key, &value, task.ttl_seconds, &task.tags)
            .await;
        if !stored {
            return Err(CacheError::Internal("cache rejected warmed value".to_string()));
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::lock::mutex_lock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records start order, sleeps briefly, and fails tasks whose target
    /// starts with `/fail`.
    #[derive(Default)]
    struct RecordingLoader {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WarmupLoader for RecordingLoader {
        async fn load(&self, task: &WarmupTask) -> Result<Value> {
            mutex_lock(&self.started, "test.started").push(task.id.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            if task.target.starts_with("/fail") {
                return Err(CacheError::Loader("upstream 500".to_string()));
            }
            if task.target.starts_with("/hang") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(json!({ "target": task.target }))
        }
    }

    fn scheduler(settings: WarmingSettings) -> (WarmingScheduler, Arc<RecordingLoader>, Arc<CacheCore>) {
        let cache = Arc::new(CacheCore::new(
            Arc::new(MemoryStore::new(1_000)),
            CacheSettings::default(),
        ));
        let loader = Arc::new(RecordingLoader::default());
        (WarmingScheduler::new(cache.clone(), loader.clone(), settings), loader, cache)
    }

    fn started(loader: &RecordingLoader) -> Vec<String> {
        mutex_lock(&loader.started, "test.read").clone()
    }

    #[tokio::test]
    async fn test_bands_run_in_priority_order() {
        let (scheduler, loader, _) = scheduler(WarmingSettings::default());
        scheduler.register_task(WarmupTask::new("low", "/low", 8_000));
        scheduler.register_task(WarmupTask::new("medium", "/medium", 3_000));
        scheduler.register_task(WarmupTask::new("high", "/high", 500));

        let report = scheduler.execute_strategy(Strategy::Comprehensive).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(started(&loader), vec!["high", "medium", "low"]);
    }

    #[tokio::test]
    async fn test_low_band_is_sequential() {
        let (scheduler, loader, _) = scheduler(WarmingSettings::default());
        for id in ["l1", "l2", "l3"] {
            scheduler.register_task(WarmupTask::new(id, format!("/{id}"), 9_000));
        }
        let report = scheduler.execute_strategy(Strategy::Standard).await;
        assert_eq!(report.succeeded, 3);
        assert!(report.duration_ms >= 60, "three 20ms loads back to back");
        assert_eq!(started(&loader), vec!["l1", "l2", "l3"]);
    }

    #[tokio::test]
    async fn test_warmed_values_land_in_cache() {
        let (scheduler, _, cache) = scheduler(WarmingSettings::default());
        scheduler.register_task(WarmupTask::new("users", "/users", 100).with_tags(&["users"]).with_ttl(120));

        let report = scheduler.execute_strategy(Strategy::HighPriority).await;
        assert_eq!(report.succeeded, 1);

        let entry = cache.get_entry("api", "/users").await.unwrap();
        assert_eq!(entry.value["target"], "/users");
        assert_eq!(entry.ttl_seconds, 120);
        assert_eq!(cache.invalidate_by_tag("users").await, 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (scheduler, _, _) = scheduler(WarmingSettings::default());
        scheduler.register_task(WarmupTask::new("ok", "/ok", 100));
        scheduler.register_task(WarmupTask::new("bad", "/fail", 100));

        let report = scheduler.execute_strategy(Strategy::Standard).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        let bad = scheduler.task("bad").unwrap();
        assert_eq!(bad.error_count, 1);
        assert_eq!(bad.consecutive_errors, 1);
        assert_eq!(bad.last_error.as_deref(), Some("Loader error: upstream 500"));
        assert_eq!(scheduler.task("ok").unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_tasks_skipped_until_comprehensive() {
        let (scheduler, _, _) = scheduler(WarmingSettings::default());
        scheduler.register_task(WarmupTask::new("bad", "/fail", 100));

        for _ in 0..3 {
            scheduler.execute_strategy(Strategy::HighPriority).await;
        }
        let report = scheduler.execute_strategy(Strategy::HighPriority).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 1);

        let report = scheduler.execute_strategy(Strategy::Comprehensive).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(scheduler.task("bad").unwrap().error_count, 4);
    }

    #[tokio::test]
    async fn test_slow_loader_times_out() {
        let settings = WarmingSettings {
            task_timeout_ms: 100,
            ..WarmingSettings::default()
        };
        let (scheduler, _, _) = scheduler(settings);
        scheduler.register_task(WarmupTask::new("hang", "/hang", 100));

        let result = scheduler.warm_now("hang").await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(scheduler.warm_now("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_tasks_persist_with_counters() {
        let (scheduler, _, cache) = scheduler(WarmingSettings::default());
        scheduler.register_task(WarmupTask::new("a", "/a", 100));
        scheduler.warm_now("a").await;
        assert!(scheduler.save_tasks().await);

        let restored = WarmingScheduler::new(cache, Arc::new(RecordingLoader::default()), WarmingSettings::default());
        assert_eq!(restored.load_tasks().await, 1);
        assert_eq!(restored.task("a").unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_registry_and_stats() {
        let (scheduler, _, _) = scheduler(WarmingSettings::default());
        assert!(scheduler.register_task(WarmupTask::new("h", "/h", 100)));
        assert!(scheduler.register_task(WarmupTask::new("m", "/m", 2_500)));
        assert!(!scheduler.register_task(WarmupTask::new("", "/x", 100)));

        let stats = scheduler.stats();
        assert_eq!((stats.tasks, stats.high, stats.medium, stats.low), (2, 1, 1, 0));

        assert!(scheduler.remove_task("m"));
        assert!(!scheduler.remove_task("m"));
        assert_eq!(scheduler.tasks().len(), 1);
    }
}
