//! Cache Module
//!
//! Tag-indexed, fail-open caching over a `StoreClient`, with key derivation
//! and hit/miss statistics.

mod core;
pub mod keys;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use self::core::{CacheCore, CacheEntry};
pub use keys::KeyBuilder;
pub use stats::{CacheStats, StatsRecorder};
