//! Store change notifications feeding the invalidation engine.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::invalidation::InvalidationEngine;
use crate::store::StoreClient;

/// Subscribes to the configured change channel before returning, then hands
/// every message to `InvalidationEngine::handle_store_change`.
pub async fn spawn_store_change_listener(
    store: Arc<dyn StoreClient>,
    engine: Arc<InvalidationEngine>,
) -> Result<JoinHandle<()>> {
    let channel = engine.settings().events_channel.clone();
    let mut subscription = store.subscribe(&channel).await?;
    info!(channel = %channel, "Listening for store change events");

    Ok(tokio::spawn(async move {
        while let Some(message) = subscription.next_message().await {
            let report = engine.handle_store_change(&message).await;
            debug!(
                matched = report.matched_rules,
                scheduled = report.scheduled,
                affected = report.affected_keys(),
                "Store change handled"
            );
        }
        warn!(channel = %subscription.channel(), "Store change channel closed");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheCore;
    use crate::config::{CacheSettings, InvalidationSettings};
    use crate::invalidation::{InvalidationRule, Target, Trigger, TriggerType};
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_published_change_runs_matching_rule() {
        let store: Arc<dyn StoreClient> = Arc::new(MemoryStore::new(100));
        let cache = Arc::new(CacheCore::new(store.clone(), CacheSettings::default()));
        let engine = Arc::new(InvalidationEngine::new(cache.clone(), InvalidationSettings::default()));

        let rule = InvalidationRule::new(
            "orders-changed",
            vec![Trigger::new(TriggerType::StoreChange, "orders")],
            vec![Target::tag("orders")],
        );
        assert!(engine.add_rule(rule));
        let tags = vec!["orders".to_string()];
        assert!(cache.set("api", "orders:1", &1, None, &tags).await);

        let handle = spawn_store_change_listener(store.clone(), engine.clone()).await.unwrap();
        let channel = engine.settings().events_channel.clone();
        store
            .publish(&channel, r#"{"source":"orders","payload":{}}"#)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cache.exists("api", "orders:1").await);
        handle.abort();
    }
}
