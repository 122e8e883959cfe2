//! Dependency graph for cascade invalidation.
//!
//! An adjacency list from a target value (a tag, key, pattern or prefix as
//! written in a rule) to the tags that must be cleared after it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::RwLock;

use crate::lock::{rw_read, rw_write};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that invalidating `target` must also clear `dependent_tag`.
    pub fn add_dependency(&self, target: impl Into<String>, dependent_tag: impl Into<String>) {
        rw_write(&self.edges, "deps.add")
            .entry(target.into())
            .or_default()
            .insert(dependent_tag.into());
    }

    pub fn remove_dependency(&self, target: &str, dependent_tag: &str) -> bool {
        let mut edges = rw_write(&self.edges, "deps.remove");
        let Some(dependents) = edges.get_mut(target) else {
            return false;
        };
        let removed = dependents.remove(dependent_tag);
        if dependents.is_empty() {
            edges.remove(target);
        }
        removed
    }

    /// Direct dependents of `target`.
    pub fn dependents_of(&self, target: &str) -> BTreeSet<String> {
        rw_read(&self.edges, "deps.dependents_of")
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Every tag reachable from `root`, breadth first, excluding `root` and
    /// visiting each node once so cycles terminate.
    pub fn cascade_from(&self, root: &str) -> Vec<String> {
        let edges = rw_read(&self.edges, "deps.cascade");
        let mut visited = BTreeSet::from([root.to_string()]);
        let mut queue = VecDeque::from([root.to_string()]);
        let mut order = Vec::new();

        while let Some(node) = queue.pop_front() {
            for next in edges.get(&node).into_iter().flatten() {
                if visited.insert(next.clone()) {
                    order.push(next.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        order
    }

    /// Snapshot of the whole graph.
    pub fn edges(&self) -> BTreeMap<String, BTreeSet<String>> {
        rw_read(&self.edges, "deps.edges").clone()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.edges, "deps.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
