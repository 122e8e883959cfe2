//! Store Module
//!
//! The remote key/value store contract, an in-process implementation of it,
//! and the decorator layers every store handle is wrapped in.

mod client;
mod entry;
mod layers;
mod lru;
mod memory;
mod pattern;

use std::sync::Arc;
use std::time::Duration;

pub use client::{ScanPage, StoreClient, StoreInfo, Subscription, TTL_MISSING, TTL_PERSISTENT};
pub use entry::{StoreEntry, StoredValue};
pub use layers::{TimeoutLayer, TracingLayer};
pub use lru::LruTracker;
pub use memory::MemoryStore;
pub use pattern::GlobPattern;

/// Wraps a raw store in the standard decorator chain: tracing outermost,
/// then the per-call timeout.
pub fn layered<S>(store: S, timeout: Duration) -> Arc<dyn StoreClient>
where
    S: StoreClient + 'static,
{
    Arc::new(TracingLayer::new(TimeoutLayer::new(store, timeout)))
}
