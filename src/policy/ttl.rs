//! TTL computation for cached responses.

use serde_json::Value;

use crate::policy::MAX_WALK_DEPTH;

/// TTL used when a category is unknown and the response is flat.
pub const BASE_TTL_SECONDS: u64 = 300;

/// Lowest TTL the complexity fallback will return.
pub const DEFAULT_TTL_FLOOR_SECONDS: u64 = 60;

/// Named categories and their fixed TTLs.
const CATEGORY_TTLS: &[(&str, u64)] = &[
    ("user-profile", 300),
    ("user-list", 600),
    ("catalog-list", 1800),
    ("catalog-item", 3600),
    ("search-results", 120),
    ("analytics", 900),
    ("static-content", 86_400),
];

// == TTL Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    floor_seconds: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_FLOOR_SECONDS)
    }
}

impl TtlPolicy {
    pub fn new(floor_seconds: u64) -> Self {
        Self { floor_seconds }
    }

    /// TTL for `category`, falling back to a depth-scaled default.
    ///
    /// Every nesting level beyond the second shaves a quarter of the base TTL
    /// off, never going below the floor. Named categories are not clamped.
    pub fn compute_ttl(&self, category: Option<&str>, content_depth: usize) -> u64 {
        if let Some(ttl) = category.and_then(category_ttl) {
            return ttl;
        }
        let extra_levels = content_depth.saturating_sub(2) as f64;
        let scaled = (BASE_TTL_SECONDS as f64 / (1.0 + 0.25 * extra_levels)) as u64;
        scaled.max(self.floor_seconds)
    }
}

/// Fixed TTL of a named category.
pub fn category_ttl(category: &str) -> Option<u64> {
    CATEGORY_TTLS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, ttl)| *ttl)
}

/// Nesting depth of a JSON document; scalars are depth 0. Stops counting at
/// the walk limit.
pub fn content_depth(value: &Value) -> usize {
    fn walk(value: &Value, depth: usize) -> usize {
        if depth >= MAX_WALK_DEPTH {
            return depth;
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| walk(item, depth + 1))
                .max()
                .unwrap_or(depth + 1),
            Value::Object(fields) => fields
                .values()
                .map(|field| walk(field, depth + 1))
                .max()
                .unwrap_or(depth + 1),
            _ => depth,
        }
    }
    walk(value, 0)
}
