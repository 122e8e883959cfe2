//! Invalidation Engine
//!
//! Matches trigger firings against the rule set and clears the targets of
//! every rule that fires, immediately, after a delay, or once a debounce
//! window has gone quiet. Delayed and debounced firings are tokio tasks that
//! can be cancelled by rule id.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::keys::sanitize;
use crate::cache::CacheCore;
use crate::clock::current_timestamp_ms;
use crate::config::InvalidationSettings;
use crate::error::{CacheError, Result};
use crate::invalidation::deps::DependencyGraph;
use crate::invalidation::history::{EventHistory, InvalidationEvent};
use crate::invalidation::rules::{escape_glob, InvalidationRule, Target, TargetKind, TriggerSource, TriggerType};
use crate::lock::{mutex_lock, rw_read, rw_write};

/// Name of the persisted rule document.
const RULES_DOCUMENT: &str = "invalidation-rules";

/// Identity of a delayed firing: the rule, when it fired, and a sequence
/// number separating firings within the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    rule_id: String,
    fired_at_epoch_ms: u64,
    seq: u64,
}

/// The pending debounce timer of one rule.
struct DebounceSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// What happened to a firing.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReport {
    pub matched_rules: usize,
    /// Rules executed before the call returned
    pub executed: Vec<InvalidationEvent>,
    /// Rules handed to a delay or debounce timer
    pub scheduled: usize,
}

impl TriggerReport {
    pub fn affected_keys(&self) -> u64 {
        self.executed.iter().map(|e| e.affected_keys).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationStats {
    pub rules: usize,
    pub enabled_rules: usize,
    pub pending: usize,
    pub executions: u64,
    pub failures: u64,
    pub affected_keys: u64,
    pub history_len: usize,
}

// == Invalidation Engine ==
pub struct InvalidationEngine {
    cache: Arc<CacheCore>,
    settings: InvalidationSettings,
    rules: RwLock<BTreeMap<String, InvalidationRule>>,
    deps: DependencyGraph,
    history: EventHistory,
    delayed: Mutex<HashMap<PendingKey, JoinHandle<()>>>,
    debounced: Mutex<HashMap<String, DebounceSlot>>,
    seq: AtomicU64,
    executions: AtomicU64,
    failures: AtomicU64,
    affected_keys: AtomicU64,
}

impl InvalidationEngine {
    pub fn new(cache: Arc<CacheCore>, settings: InvalidationSettings) -> Self {
        Self {
            history: EventHistory::new(settings.history_limit),
            cache,
            settings,
            rules: RwLock::new(BTreeMap::new()),
            deps: DependencyGraph::new(),
            delayed: Mutex::new(HashMap::new()),
            debounced: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            affected_keys: AtomicU64::new(0),
        }
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.deps
    }

    pub fn settings(&self) -> &InvalidationSettings {
        &self.settings
    }

    // == Rule Management ==
    /// Adds or replaces a rule. Invalid rules are logged and rejected.
    pub fn add_rule(&self, rule: InvalidationRule) -> bool {
        if let Err(err) = rule.validate() {
            warn!(rule_id = %rule.id, error = %err, "Rejected invalidation rule");
            return false;
        }
        info!(rule_id = %rule.id, triggers = rule.triggers.len(), targets = rule.targets.len(), "Invalidation rule registered");
        rw_write(&self.rules, "invalidation.add_rule").insert(rule.id.clone(), rule);
        true
    }

    /// Removes a rule and cancels anything it still has scheduled.
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let removed = rw_write(&self.rules, "invalidation.remove_rule")
            .remove(rule_id)
            .is_some();
        let cancelled = self.cancel_pending(rule_id);
        if removed {
            info!(rule_id, cancelled, "Invalidation rule removed");
        }
        removed
    }

    pub fn rule(&self, rule_id: &str) -> Option<InvalidationRule> {
        rw_read(&self.rules, "invalidation.rule").get(rule_id).cloned()
    }

    pub fn rules(&self) -> Vec<InvalidationRule> {
        rw_read(&self.rules, "invalidation.rules").values().cloned().collect()
    }

    /// Persists the rule set to the store.
    pub async fn save_rules(&self) -> bool {
        let rules = self.rules();
        self.cache.save_document(RULES_DOCUMENT, &rules).await
    }

    /// Loads persisted rules, returning how many were accepted.
    pub async fn load_rules(&self) -> usize {
        let Some(rules) = self
            .cache
            .load_document::<Vec<InvalidationRule>>(RULES_DOCUMENT)
            .await
        else {
            return 0;
        };
        let loaded = rules.into_iter().filter(|rule| self.add_rule(rule.clone())).count();
        info!(loaded, "Invalidation rules restored");
        loaded
    }

    // == Trigger Invalidation ==
    /// Fires every enabled rule that matches `source` and `payload`.
    ///
    /// `immediate` skips delay and debounce and runs matching rules before
    /// returning; manual firings are always immediate.
    pub async fn trigger_invalidation(
        self: &Arc<Self>,
        source: &TriggerSource,
        payload: &Value,
        immediate: bool,
    ) -> TriggerReport {
        let matching: Vec<InvalidationRule> = rw_read(&self.rules, "invalidation.trigger")
            .values()
            .filter(|rule| rule.matches(source, payload))
            .cloned()
            .collect();

        let mut report = TriggerReport {
            matched_rules: matching.len(),
            ..TriggerReport::default()
        };
        let immediate = immediate || source.kind == TriggerType::Manual;

        for rule in matching {
            let debounce_ms = rule.debounce_ms.unwrap_or(self.settings.default_debounce_ms);
            if !immediate && debounce_ms > 0 {
                self.debounce(rule, source.clone(), payload.clone(), debounce_ms);
                report.scheduled += 1;
            } else if !immediate && rule.delay_ms > 0 {
                self.schedule(rule, source.clone(), payload.clone());
                report.scheduled += 1;
            } else {
                report.executed.push(self.execute_rule(&rule, source, payload).await);
            }
        }

        debug!(
            source = %source.describe(),
            matched = report.matched_rules,
            scheduled = report.scheduled,
            "Trigger processed"
        );
        report
    }

    pub async fn invalidate_by_event(self: &Arc<Self>, name: &str, payload: &Value) -> TriggerReport {
        self.trigger_invalidation(&TriggerSource::event(name), payload, false)
            .await
    }

    pub async fn handle_webhook(self: &Arc<Self>, name: &str, payload: &Value) -> TriggerReport {
        self.trigger_invalidation(&TriggerSource::new(TriggerType::Webhook, name), payload, false)
            .await
    }

    /// Handles a store-change notification. JSON messages of the form
    /// `{"source": .., "payload": ..}` carry a payload; anything else is
    /// taken as a bare source name.
    pub async fn handle_store_change(self: &Arc<Self>, message: &str) -> TriggerReport {
        let (name, payload) = match serde_json::from_str::<Value>(message) {
            Ok(Value::Object(mut fields)) => {
                let name = fields
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (name, fields.remove("payload").unwrap_or(Value::Null))
            }
            _ => (message.trim().to_string(), Value::Null),
        };
        self.trigger_invalidation(&TriggerSource::new(TriggerType::StoreChange, name), &payload, false)
            .await
    }

    // == Direct invalidation ==
    /// Clears everything tagged with or keyed by the user. Key matches stop
    /// at a segment boundary, so user 4 leaves user 42 alone.
    pub async fn invalidate_user_cache(&self, user_id: &str) -> u64 {
        let stored_id = sanitize(user_id);
        let targets = vec![
            Target::tag(format!("user:{user_id}")).cascading(),
            Target::pattern(format!("*:user:{stored_id}")),
            Target::pattern(format!("*:user:{stored_id}:*")),
        ];
        self.run_direct(&format!("manual:user:{user_id}"), targets, false).await
    }

    /// Clears one resource and the lists it appears in.
    pub async fn invalidate_resource_cache(&self, resource_type: &str, id: &str) -> u64 {
        let targets = vec![
            Target::tag(format!("{resource_type}:{id}")).cascading(),
            Target::tag(format!("{resource_type}:list")),
        ];
        self.run_direct(&format!("manual:{resource_type}:{id}"), targets, false).await
    }

    /// Runs every target concurrently and returns the total removed.
    pub async fn batch_invalidate(&self, targets: Vec<Target>) -> u64 {
        self.run_direct("manual:batch", targets, true).await
    }

    async fn run_direct(&self, trigger: &str, targets: Vec<Target>, concurrent: bool) -> u64 {
        let event = self
            .run_targets(None, trigger.to_string(), &targets, concurrent)
            .await;
        let affected = event.affected_keys;
        self.finish(event);
        affected
    }

    // == Cancellation ==
    /// Cancels delayed and debounced firings of `rule_id`; returns how many.
    pub fn cancel_pending(&self, rule_id: &str) -> usize {
        let mut cancelled = 0;
        mutex_lock(&self.delayed, "invalidation.cancel").retain(|key, handle| {
            if key.rule_id == rule_id {
                handle.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        if let Some(slot) = mutex_lock(&self.debounced, "invalidation.cancel").remove(rule_id) {
            slot.handle.abort();
            cancelled += 1;
        }
        if cancelled > 0 {
            debug!(rule_id, cancelled, "Pending invalidations cancelled");
        }
        cancelled
    }

    /// Cancels everything scheduled, for shutdown.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for (_, handle) in mutex_lock(&self.delayed, "invalidation.cancel_all").drain() {
            handle.abort();
            cancelled += 1;
        }
        for (_, slot) in mutex_lock(&self.debounced, "invalidation.cancel_all").drain() {
            slot.handle.abort();
            cancelled += 1;
        }
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        mutex_lock(&self.delayed, "invalidation.pending").len()
            + mutex_lock(&self.debounced, "invalidation.pending").len()
    }

    // == History & Stats ==
    pub fn history(&self, limit: usize) -> Vec<InvalidationEvent> {
        self.history.recent(limit)
    }

    pub fn stats(&self) -> InvalidationStats {
        let (rules, enabled_rules) = {
            let rules = rw_read(&self.rules, "invalidation.stats");
            (rules.len(), rules.values().filter(|r| r.enabled).count())
        };
        InvalidationStats {
            rules,
            enabled_rules,
            pending: self.pending_count(),
            executions: self.executions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            affected_keys: self.affected_keys.load(Ordering::Relaxed),
            history_len: self.history.len(),
        }
    }

    // == Scheduling ==
    /// Runs the rule once `delay_ms` has passed unless cancelled first.
    fn schedule(self: &Arc<Self>, rule: InvalidationRule, source: TriggerSource, payload: Value) {
        let key = PendingKey {
            rule_id: rule.id.clone(),
            fired_at_epoch_ms: current_timestamp_ms(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let delay = Duration::from_millis(rule.delay_ms);
        let engine = Arc::clone(self);
        let task_key = key.clone();

        // Hold the map while spawning so the task cannot look for its entry
        // before it exists.
        let mut delayed = mutex_lock(&self.delayed, "invalidation.schedule");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Claiming the entry is what makes execution at-most-once.
            let claimed = mutex_lock(&engine.delayed, "invalidation.fire")
                .remove(&task_key)
                .is_some();
            if claimed {
                engine.execute_rule(&rule, &source, &payload).await;
            }
        });
        debug!(rule_id = %key.rule_id, delay_ms = delay.as_millis() as u64, "Invalidation scheduled");
        delayed.insert(key, handle);
    }

    /// Restarts the rule's debounce window; only the last firing in a burst
    /// executes, with its payload.
    fn debounce(self: &Arc<Self>, rule: InvalidationRule, source: TriggerSource, payload: Value, window_ms: u64) {
        let generation = self.seq.fetch_add(1, Ordering::Relaxed);
        let rule_id = rule.id.clone();
        let engine = Arc::clone(self);
        let window = Duration::from_millis(window_ms);

        let mut debounced = mutex_lock(&self.debounced, "invalidation.debounce");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let claimed = {
                let mut slots = mutex_lock(&engine.debounced, "invalidation.debounce_fire");
                match slots.get(&rule.id) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&rule.id);
                        true
                    }
                    _ => false,
                }
            };
            if claimed {
                engine.execute_rule(&rule, &source, &payload).await;
            }
        });
        if let Some(previous) = debounced.insert(rule_id, DebounceSlot { generation, handle }) {
            previous.handle.abort();
        }
    }

    // == Execution ==
    async fn execute_rule(&self, rule: &InvalidationRule, source: &TriggerSource, payload: &Value) -> InvalidationEvent {
        let mut resolved = Vec::with_capacity(rule.targets.len());
        let mut errors = Vec::new();
        for target in &rule.targets {
            match target.resolve(payload) {
                Ok(target) => resolved.push(target),
                Err(err) => errors.push(err.to_string()),
            }
        }

        let mut event = self
            .run_targets(Some(rule.id.clone()), source.describe(), &resolved, rule.batch)
            .await;
        if !errors.is_empty() {
            event.success = false;
            let mut all = errors;
            all.extend(event.error.take());
            event.error = Some(all.join("; "));
        }
        info!(
            rule_id = %rule.id,
            affected = event.affected_keys,
            success = event.success,
            "Invalidation rule executed"
        );
        self.finish(event.clone());
        event
    }

    async fn run_targets(
        &self,
        rule_id: Option<String>,
        trigger: String,
        targets: &[Target],
        concurrent: bool,
    ) -> InvalidationEvent {
        let mut event = InvalidationEvent::new(
            rule_id,
            trigger,
            targets.iter().map(Target::describe).collect(),
        );

        let results = if concurrent {
            join_all(targets.iter().map(|t| self.invalidate_target(t))).await
        } else {
            let mut results = Vec::with_capacity(targets.len());
            for target in targets {
                results.push(self.invalidate_target(target).await);
            }
            results
        };

        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(count) => event.affected_keys += count,
                Err(err) => errors.push(err.to_string()),
            }
        }
        if !errors.is_empty() {
            event.success = false;
            event.error = Some(errors.join("; "));
        }
        event
    }

    async fn invalidate_target(&self, target: &Target) -> Result<u64> {
        let mut affected = match target.kind {
            TargetKind::Key => {
                let (namespace, key) = target.value.split_once(':').ok_or_else(|| {
                    CacheError::Validation(format!("key target `{}` must read namespace:key", target.value))
                })?;
                u64::from(self.cache.delete(namespace, key).await)
            }
            TargetKind::Pattern => self.cache.invalidate_by_pattern(&target.value).await,
            TargetKind::Tag => self.cache.invalidate_by_tag(&target.value).await,
            TargetKind::Prefix => {
                let glob = format!("{}*", escape_glob(&target.value));
                self.cache.invalidate_by_pattern(&glob).await
            }
        };

        if target.cascade {
            for tag in self.deps.cascade_from(&target.value) {
                affected += self.cache.invalidate_by_tag(&tag).await;
            }
        }
        Ok(affected)
    }

    fn finish(&self, event: InvalidationEvent) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if !event.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(trigger = %event.trigger, error = ?event.error, "Invalidation finished with errors");
        }
        self.affected_keys.fetch_add(event.affected_keys, Ordering::Relaxed);
        self.history.record(event);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::invalidation::rules::{Condition, ConditionOp, Trigger};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn engine_with(settings: InvalidationSettings) -> (Arc<InvalidationEngine>, Arc<CacheCore>) {
        let cache = Arc::new(CacheCore::new(
            Arc::new(MemoryStore::new(1_000)),
            CacheSettings::default(),
        ));
        (Arc::new(InvalidationEngine::new(cache.clone(), settings)), cache)
    }

    fn engine() -> (Arc<InvalidationEngine>, Arc<CacheCore>) {
        engine_with(InvalidationSettings::default())
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_event_rule_clears_tag() {
        let (engine, cache) = engine();
        cache.set("api", "user:42", &json!({}), None, &tags(&["user:42"])).await;
        assert!(engine.add_rule(InvalidationRule::new(
            "user-updated",
            vec![Trigger::event("user.updated")],
            vec![Target::tag("user:{id}")],
        )));

        let report = engine.invalidate_by_event("user.updated", &json!({"id": 42})).await;
        assert_eq!(report.matched_rules, 1);
        assert_eq!(report.affected_keys(), 1);
        assert!(!cache.exists("api", "user:42").await);

        let again = engine.invalidate_by_event("user.updated", &json!({"id": 42})).await;
        assert_eq!(again.affected_keys(), 0, "second run is a no-op");
        assert!(again.executed[0].success);
    }

    #[tokio::test]
    async fn test_conditions_gate_rule() {
        let (engine, cache) = engine();
        cache.set("api", "eu", &1, None, &tags(&["orders"])).await;
        engine.add_rule(
            InvalidationRule::new("eu-orders", vec![Trigger::event("order.paid")], vec![Target::tag("orders")])
                .with_condition(Condition::new("region", ConditionOp::Equals, "eu")),
        );

        let report = engine.invalidate_by_event("order.paid", &json!({"region": "us"})).await;
        assert_eq!(report.matched_rules, 0);
        assert!(cache.exists("api", "eu").await);

        engine.invalidate_by_event("order.paid", &json!({"region": "eu"})).await;
        assert!(!cache.exists("api", "eu").await);
    }

    #[tokio::test]
    async fn test_missing_placeholder_records_failure() {
        let (engine, _) = engine();
        engine.add_rule(InvalidationRule::new(
            "needs-id",
            vec![Trigger::event("e")],
            vec![Target::tag("user:{id}")],
        ));

        let report = engine.invalidate_by_event("e", &json!({})).await;
        let event = &report.executed[0];
        assert!(!event.success);
        assert!(event.error.as_deref().unwrap().contains("{id}"));
        assert_eq!(engine.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_all_target_kinds() {
        let (engine, cache) = engine();
        cache.set("api", "one", &1, None, &[]).await;
        cache.set("api", "list:1", &1, None, &[]).await;
        cache.set("api", "list:2", &1, None, &[]).await;
        cache.set("feed", "a", &1, None, &[]).await;
        cache.set("feed", "b", &1, None, &[]).await;
        cache.set("x", "t", &1, None, &tags(&["t"])).await;

        let removed = engine
            .batch_invalidate(vec![
                Target::new(TargetKind::Key, "api:one"),
                Target::pattern("api:list:*"),
                Target::new(TargetKind::Prefix, "feed:"),
                Target::tag("t"),
            ])
            .await;
        assert_eq!(removed, 6);
        assert_eq!(engine.history(1)[0].targets.len(), 4);
    }

    #[tokio::test]
    async fn test_cascade_follows_dependency_graph() {
        let (engine, cache) = engine();
        cache.set("api", "user", &1, None, &tags(&["User:1"])).await;
        cache.set("api", "team", &1, None, &tags(&["Team:7"])).await;
        cache.set("api", "org", &1, None, &tags(&["Org:3"])).await;
        cache.set("api", "other", &1, None, &tags(&["Org:4"])).await;
        engine.dependencies().add_dependency("User:1", "Team:7");
        engine.dependencies().add_dependency("Team:7", "Org:3");

        assert_eq!(engine.invalidate_resource_cache("User", "1").await, 3);
        assert!(cache.exists("api", "other").await);

        let flat = engine.batch_invalidate(vec![Target::tag("User:1")]).await;
        assert_eq!(flat, 0);
    }

    #[tokio::test]
    async fn test_invalidate_user_cache() {
        let (engine, cache) = engine();
        cache.set("api", "profile", &1, None, &tags(&["user:42"])).await;
        cache.set("api", "user:42:feed", &1, None, &[]).await;
        cache.set("api", "user:7:feed", &1, None, &[]).await;

        assert_eq!(engine.invalidate_user_cache("42").await, 2);
        assert!(cache.exists("api", "user:7:feed").await);
    }

    #[tokio::test]
    async fn test_invalidate_user_cache_stops_at_segment_boundary() {
        let (engine, cache) = engine();
        cache.set("api", "user:4", &1, None, &[]).await;
        cache.set("api", "user:4:orders", &1, None, &[]).await;
        cache.set("api", "user:42:profile", &1, None, &[]).await;
        cache.set("api", "superuser:4", &1, None, &[]).await;
        cache.set("api", "user:a b", &1, None, &[]).await;

        assert_eq!(engine.invalidate_user_cache("4").await, 2);
        assert!(cache.exists("api", "user:42:profile").await);
        assert!(cache.exists("api", "superuser:4").await);

        // Stored keys are sanitized, and so is the id matched against them.
        assert_eq!(engine.invalidate_user_cache("a b").await, 1);
        assert!(!cache.exists("api", "user:a b").await);
    }

    #[tokio::test]
    async fn test_payload_wildcards_do_not_widen_pattern_targets() {
        let (engine, cache) = engine();
        for i in 0..5 {
            cache.set("api", &format!("user:{i}"), &i, None, &[]).await;
        }
        engine.add_rule(InvalidationRule::new(
            "user-changed",
            vec![Trigger::event("user.changed")],
            vec![Target::pattern("api:user:{id}")],
        ));

        let report = engine.invalidate_by_event("user.changed", &json!({"id": "*"})).await;
        assert_eq!(report.executed[0].affected_keys, 0);
        assert_eq!(report.executed[0].targets, vec![r"pattern:api:user:\*"]);

        let report = engine.invalidate_by_event("user.changed", &json!({"id": 3})).await;
        assert_eq!(report.executed[0].affected_keys, 1);
        assert!(cache.exists("api", "user:4").await);
    }

    #[tokio::test]
    async fn test_delayed_rule_runs_once_after_delay() {
        let (engine, cache) = engine();
        cache.set("api", "k", &1, None, &tags(&["t"])).await;
        engine.add_rule(
            InvalidationRule::new("slow", vec![Trigger::event("e")], vec![Target::tag("t")]).with_delay(100),
        );

        let report = engine.invalidate_by_event("e", &Value::Null).await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(engine.pending_count(), 1);
        assert!(cache.exists("api", "k").await);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!cache.exists("api", "k").await);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_immediate_bypasses_delay() {
        let (engine, _) = engine();
        engine.add_rule(
            InvalidationRule::new("slow", vec![Trigger::event("e")], vec![Target::tag("t")]).with_delay(10_000),
        );

        let report = engine
            .trigger_invalidation(&TriggerSource::event("e"), &Value::Null, true)
            .await;
        assert_eq!(report.executed.len(), 1);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_removing_rule_cancels_delayed_firing() {
        let (engine, cache) = engine();
        cache.set("api", "k", &1, None, &tags(&["t"])).await;
        engine.add_rule(
            InvalidationRule::new("slow", vec![Trigger::event("e")], vec![Target::tag("t")]).with_delay(100),
        );
        engine.invalidate_by_event("e", &Value::Null).await;
        engine.invalidate_by_event("e", &Value::Null).await;
        assert_eq!(engine.pending_count(), 2);

        assert!(engine.remove_rule("slow"));
        assert_eq!(engine.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.exists("api", "k").await);
        assert!(engine.history(10).is_empty());
    }

    #[tokio::test]
    async fn test_debounce_collapses_burst() {
        let (engine, _) = engine();
        engine.add_rule(
            InvalidationRule::new("burst", vec![Trigger::event("e")], vec![Target::tag("t")]).with_debounce(500),
        );

        for i in 0..5 {
            let report = engine.invalidate_by_event("e", &json!({"n": i})).await;
            assert_eq!(report.scheduled, 1);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(engine.history(10).len(), 1);
        assert_eq!(engine.stats().executions, 1);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_default_debounce_applies_to_rules_without_one() {
        let settings = InvalidationSettings {
            default_debounce_ms: 100,
            ..InvalidationSettings::default()
        };
        let (engine, _) = engine_with(settings);
        engine.add_rule(InvalidationRule::new("r", vec![Trigger::event("e")], vec![Target::tag("t")]));
        engine.add_rule(
            InvalidationRule::new("now", vec![Trigger::event("e")], vec![Target::tag("t")]).with_debounce(0),
        );

        let report = engine.invalidate_by_event("e", &Value::Null).await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.executed.len(), 1);
    }

    #[tokio::test]
    async fn test_store_change_and_webhook_sources() {
        let (engine, _) = engine();
        engine.add_rule(InvalidationRule::new(
            "sc",
            vec![Trigger::new(TriggerType::StoreChange, "products")],
            vec![Target::tag("product:{id}")],
        ));
        engine.add_rule(InvalidationRule::new(
            "wh",
            vec![Trigger::new(TriggerType::Webhook, "cms.publish")],
            vec![Target::tag("cms")],
        ));

        let report = engine
            .handle_store_change(r#"{"source": "products", "payload": {"id": 9}}"#)
            .await;
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].targets, vec!["tag:product:9"]);

        assert_eq!(engine.handle_store_change("products").await.matched_rules, 1);
        assert_eq!(engine.handle_webhook("cms.publish", &Value::Null).await.matched_rules, 1);
        assert_eq!(engine.invalidate_by_event("cms.publish", &Value::Null).await.matched_rules, 0);
    }

    #[tokio::test]
    async fn test_rules_persist_and_reload() {
        let (engine, cache) = engine();
        engine.add_rule(InvalidationRule::new("a", vec![Trigger::event("x")], vec![Target::tag("t")]));
        engine.add_rule(InvalidationRule::new("b", vec![Trigger::event("y")], vec![Target::tag("u")]));
        assert!(engine.save_rules().await);

        let restored = Arc::new(InvalidationEngine::new(cache, InvalidationSettings::default()));
        assert_eq!(restored.load_rules().await, 2);
        assert_eq!(restored.rules(), engine.rules());
    }

    #[tokio::test]
    async fn test_invalid_rule_rejected() {
        let (engine, _) = engine();
        assert!(!engine.add_rule(InvalidationRule::new("r", vec![], vec![Target::tag("t")])));
        assert!(engine.rules().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let settings = InvalidationSettings {
            history_limit: 5,
            ..InvalidationSettings::default()
        };
        let (engine, _) = engine_with(settings);
        for _ in 0..8 {
            engine.batch_invalidate(vec![Target::tag("t")]).await;
        }
        assert_eq!(engine.history(100).len(), 5);
        assert_eq!(engine.stats().executions, 8);
    }
}
