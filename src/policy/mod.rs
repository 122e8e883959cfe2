//! TTL & Tag Policy
//!
//! Pure functions that decide how long a response may be cached and which
//! tags it is indexed under, plus the response cache built on them.

mod response_cache;
mod tags;
mod ttl;

pub use response_cache::ResponseCache;
pub use tags::{extract_tags, RequestDescriptor};
pub use ttl::{category_ttl, content_depth, TtlPolicy, BASE_TTL_SECONDS, DEFAULT_TTL_FLOOR_SECONDS};

/// Deepest nesting level the JSON walkers visit.
pub const MAX_WALK_DEPTH: usize = 32;
