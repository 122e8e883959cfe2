//! LRU Tracker Module
//!
//! Access-order bookkeeping used by the in-process store to pick eviction
//! victims once it reaches capacity.

use std::collections::VecDeque;

// == LRU Tracker ==
/// Keys ordered by access time: front is most recent, back is least recent.
#[derive(Debug, Default)]
pub struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key accepted by
    /// `evictable`, leaving every other key in place.
    pub fn evict_oldest_where<F>(&mut self, mut evictable: F) -> Option<String>
    where
        F: FnMut(&str) -> bool,
    {
        let position = self.order.iter().rposition(|key| evictable(key))?;
        self.order.remove(position)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
