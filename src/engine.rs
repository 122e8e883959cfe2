//! Engine Assembly
//!
//! Wires every component over one shared store handle and owns the
//! background tasks spawned for them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::CacheCore;
use crate::config::Config;
use crate::error::Result;
use crate::invalidation::InvalidationEngine;
use crate::monitoring::CacheMonitor;
use crate::policy::{ResponseCache, TtlPolicy};
use crate::session::SessionStore;
use crate::store::{layered, MemoryStore, StoreClient};
use crate::tasks::{spawn_cleanup_task, spawn_monitoring_task, spawn_store_change_listener, spawn_warming_schedules};
use crate::warming::{HttpWarmupLoader, WarmingScheduler, WarmupLoader};

/// Namespace of cached API responses.
pub const RESPONSE_NAMESPACE: &str = "responses";

/// Shared handles to every component. Cheap to clone.
#[derive(Clone)]
pub struct CacheEngine {
    pub config: Arc<Config>,
    /// The in-process store, for maintenance only
    pub raw_store: Arc<MemoryStore>,
    /// The decorated handle every component talks through
    pub store: Arc<dyn StoreClient>,
    pub cache: Arc<CacheCore>,
    pub sessions: Arc<SessionStore>,
    pub invalidation: Arc<InvalidationEngine>,
    pub warming: Arc<WarmingScheduler>,
    pub monitor: Arc<CacheMonitor>,
    pub responses: Arc<ResponseCache>,
}

impl CacheEngine {
    /// Builds the engine with an HTTP warmup loader. Without a configured
    /// base URL, warmup requests go to this server itself.
    pub fn from_config(config: Config) -> Result<Self> {
        let base_url = config
            .warming
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server_port));
        let loader = HttpWarmupLoader::new(base_url, config.warming.task_timeout())?;
        Ok(Self::with_loader(config, Arc::new(loader)))
    }

    pub fn with_loader(config: Config, loader: Arc<dyn WarmupLoader>) -> Self {
        let raw_store = Arc::new(MemoryStore::new(config.cache.max_entries));
        let store = layered(raw_store.clone(), config.cache.store_timeout());
        let cache = Arc::new(CacheCore::new(store.clone(), config.cache.clone()));

        Self {
            sessions: Arc::new(SessionStore::new(cache.clone(), config.session.clone())),
            invalidation: Arc::new(InvalidationEngine::new(cache.clone(), config.invalidation.clone())),
            warming: Arc::new(WarmingScheduler::new(cache.clone(), loader, config.warming.clone())),
            monitor: Arc::new(CacheMonitor::new(cache.clone(), config.monitoring.clone())),
            responses: Arc::new(ResponseCache::new(cache.clone(), RESPONSE_NAMESPACE, TtlPolicy::default())),
            config: Arc::new(config),
            raw_store,
            store,
            cache,
        }
    }

    /// Restores persisted rules and tasks, then spawns the background loops.
    /// Warmup schedules only run when a warmup base URL is configured.
    pub async fn start(&self) -> Result<BackgroundTasks> {
        let rules = self.invalidation.load_rules().await;
        let tasks = self.warming.load_tasks().await;
        info!(rules, tasks, "Restored persisted invalidation rules and warmup tasks");

        let mut handles = vec![
            spawn_cleanup_task(self.raw_store.clone(), self.config.cleanup_interval),
            spawn_monitoring_task(self.monitor.clone()),
            spawn_store_change_listener(self.store.clone(), self.invalidation.clone()).await?,
        ];
        if self.config.warming.base_url.is_some() {
            handles.extend(spawn_warming_schedules(self.warming.clone()));
        } else {
            info!("No warmup base URL configured, scheduled warming disabled");
        }

        Ok(BackgroundTasks { handles })
    }

    /// Persists rules and tasks and cancels pending invalidations.
    pub async fn shutdown(&self) {
        if !self.invalidation.save_rules().await {
            warn!("Failed to persist invalidation rules");
        }
        if !self.warming.save_tasks().await {
            warn!("Failed to persist warmup tasks");
        }
        let cancelled = self.invalidation.cancel_all();
        info!(cancelled, "Pending invalidations cancelled");
    }
}

/// Handles of the spawned background loops.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn abort_all(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}
