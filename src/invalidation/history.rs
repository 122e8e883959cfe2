//! Bounded record of executed invalidations.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::current_timestamp_ms;
use crate::lock::mutex_lock;

/// Outcome of one rule execution or direct invalidation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub id: String,
    /// `None` for direct calls that bypass the rule set
    pub rule_id: Option<String>,
    pub trigger: String,
    pub targets: Vec<String>,
    pub success: bool,
    pub affected_keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp_epoch_ms: u64,
}

impl InvalidationEvent {
    pub fn new(rule_id: Option<String>, trigger: String, targets: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id,
            trigger,
            targets,
            success: true,
            affected_keys: 0,
            error: None,
            timestamp_epoch_ms: current_timestamp_ms(),
        }
    }
}

/// Append-only ring of the most recent events.
#[derive(Debug)]
pub struct EventHistory {
    events: Mutex<VecDeque<InvalidationEvent>>,
    limit: usize,
}

impl EventHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    pub fn record(&self, event: InvalidationEvent) {
        let mut events = mutex_lock(&self.events, "history.record");
        while events.len() >= self.limit {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Newest first, at most `limit` events.
    pub fn recent(&self, limit: usize) -> Vec<InvalidationEvent> {
        mutex_lock(&self.events, "history.recent")
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.events, "history.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(trigger: &str) -> InvalidationEvent {
        InvalidationEvent::new(None, trigger.to_string(), vec![])
    }

    #[test]
    fn test_history_is_bounded() {
        let history = EventHistory::new(100);
        for i in 0..150 {
            history.record(event(&format!("e{i}")));
        }
        assert_eq!(history.len(), 100);

        let recent = history.recent(3);
        let triggers: Vec<&str> = recent.iter().map(|e| e.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["e149", "e148", "e147"]);
        assert_eq!(history.recent(1_000).last().unwrap().trigger, "e50");
    }

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(event("a").id, event("a").id);
    }
}
