//! Session Module
//!
//! Session records with idle timeout and sliding expiration, stored through
//! the cache core alongside a per-user index of session ids.

mod record;
mod store;

pub use record::{SessionData, SessionRecord, SessionUpdate};
pub use store::SessionStore;
