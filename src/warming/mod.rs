//! Warming Module
//!
//! Proactive cache population: warmup tasks, the loaders that fetch their
//! values, and the priority-banded scheduler.

mod loader;
mod scheduler;
mod task;

pub use loader::{HttpWarmupLoader, WarmupLoader};
pub use scheduler::{TaskResult, WarmingScheduler, WarmingStats, WarmupReport};
pub use task::{Priority, Strategy, WarmupTask, HIGH_PRIORITY_BELOW_MS, MEDIUM_PRIORITY_BELOW_MS};
