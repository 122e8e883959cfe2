//! Cache Engine - a tag-indexed cache over a remote key/value store
//!
//! Namespaced entries with tag-based bulk invalidation, sessions with idle
//! timeout and sliding expiration, rule-driven invalidation, priority-banded
//! cache warming, and health monitoring with alerts.

pub mod api;
pub mod cache;
mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod invalidation;
mod lock;
pub mod models;
pub mod monitoring;
pub mod policy;
pub mod session;
pub mod store;
pub mod tasks;
pub mod warming;

pub use cache::CacheCore;
pub use config::Config;
pub use engine::{BackgroundTasks, CacheEngine};
pub use error::{CacheError, Result, StoreError};
