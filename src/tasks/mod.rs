//! Background Tasks Module
//!
//! Long-running loops spawned at startup:
//! - expiry sweep of the in-process store
//! - periodic metrics collection
//! - recurring warmup strategies
//! - store change listener for event-driven invalidation

mod cleanup;
mod listener;
mod monitoring;
mod warming;

pub use cleanup::spawn_cleanup_task;
pub use listener::spawn_store_change_listener;
pub use monitoring::spawn_monitoring_task;
pub use warming::spawn_warming_schedules;
