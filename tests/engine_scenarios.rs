//! End-to-end scenarios across the engine's components.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cache_engine::config::Config;
use cache_engine::error::Result;
use cache_engine::invalidation::{InvalidationRule, Target, Trigger};
use cache_engine::policy::RequestDescriptor;
use cache_engine::session::SessionData;
use cache_engine::warming::{Strategy, WarmupLoader, WarmupTask};
use cache_engine::CacheEngine;
use serde_json::{json, Value};

// == Helper Functions ==

/// Serves `{"target": ..}` for every task and counts calls.
#[derive(Default)]
struct CountingLoader {
    calls: AtomicUsize,
}

#[async_trait]
impl WarmupLoader for CountingLoader {
    async fn load(&self, task: &WarmupTask) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "target": task.target }))
    }
}

fn engine_with(loader: Arc<CountingLoader>) -> CacheEngine {
    CacheEngine::with_loader(Config::default(), loader)
}

fn user_request(id: u64) -> RequestDescriptor {
    RequestDescriptor::new("getUser").with_param("id", id)
}

// == Scenarios ==

#[tokio::test]
async fn test_response_cache_then_event_invalidation() {
    let engine = engine_with(Arc::default());
    engine.invalidation.add_rule(InvalidationRule::new(
        "user-updated",
        vec![Trigger::event("user.updated")],
        vec![Target::tag("User:{userId}")],
    ));

    let calls = AtomicUsize::new(0);
    let loads = &calls;
    let load = move || async move {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(json!({ "__typename": "User", "id": 7, "name": "ada" }))
    };

    let first = engine.responses.fetch(&user_request(7), Some("user-profile"), load).await.unwrap();
    let second = engine.responses.fetch(&user_request(7), Some("user-profile"), load).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let report = engine
        .invalidation
        .invalidate_by_event("user.updated", &json!({ "userId": 7 }))
        .await;
    assert_eq!(report.matched_rules, 1);
    assert_eq!(report.affected_keys(), 1);

    engine.responses.fetch(&user_request(7), Some("user-profile"), load).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_delayed_rule_runs_once_after_delay() {
    let engine = engine_with(Arc::default());
    engine.invalidation.add_rule(
        InvalidationRule::new(
            "catalog-refresh",
            vec![Trigger::event("catalog.imported")],
            vec![Target::pattern("catalog:*")],
        )
        .with_delay(100),
    );
    assert!(engine.cache.set("catalog", "item:1", &1, None, &[]).await);

    let report = engine
        .invalidation
        .invalidate_by_event("catalog.imported", &Value::Null)
        .await;
    assert_eq!(report.scheduled, 1);
    assert!(engine.cache.exists("catalog", "item:1").await);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!engine.cache.exists("catalog", "item:1").await);
    assert_eq!(engine.invalidation.pending_count(), 0);
    assert_eq!(engine.invalidation.history(10).len(), 1);
}

#[tokio::test]
async fn test_warming_populates_cache() {
    let loader = Arc::new(CountingLoader::default());
    let engine = engine_with(loader.clone());
    engine
        .warming
        .register_task(WarmupTask::new("users", "/users", 500).with_tags(&["User:list"]));
    engine
        .warming
        .register_task(WarmupTask::new("reports", "/reports", 9_000));

    let report = engine.warming.execute_strategy(Strategy::Comprehensive).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

    let users: Option<Value> = engine.cache.get("api", "/users").await;
    assert_eq!(users, Some(json!({ "target": "/users" })));

    assert_eq!(engine.cache.invalidate_by_tag("User:list").await, 1);
    assert!(!engine.cache.exists("api", "/users").await);
}

#[tokio::test]
async fn test_user_sessions_lifecycle() {
    let engine = engine_with(Arc::default());
    let data = SessionData {
        roles: vec!["admin".to_string()],
        permissions: vec![],
        metadata: BTreeMap::new(),
    };

    let a = engine.sessions.create_session("u1", data.clone(), None).await.unwrap();
    let b = engine.sessions.create_session("u1", data, Some(60)).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(engine.sessions.get_user_sessions("u1").await.len(), 2);

    assert_eq!(engine.sessions.destroy_all_user_sessions("u1").await, 2);
    assert!(engine.sessions.get_session(&a).await.is_none());
    assert!(engine.sessions.get_user_sessions("u1").await.is_empty());
}

#[tokio::test]
async fn test_store_outage_degrades_to_misses() {
    let engine = engine_with(Arc::default());
    assert!(engine.cache.set("api", "k", &"v", None, &[]).await);

    engine.raw_store.set_offline(true);
    let value: Option<String> = engine.cache.get("api", "k").await;
    assert!(value.is_none());
    assert!(!engine.cache.set("api", "k2", &"v", None, &[]).await);
    assert!(engine.cache.stats().errors >= 2);

    engine.raw_store.set_offline(false);
    let value: Option<String> = engine.cache.get("api", "k").await;
    assert_eq!(value.as_deref(), Some("v"));
}
