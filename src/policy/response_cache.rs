//! Read-through caching of API and GraphQL responses.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::CacheCore;
use crate::policy::tags::{extract_tags, RequestDescriptor};
use crate::policy::ttl::{content_depth, TtlPolicy};

// == Response Cache ==
/// Caches whole responses keyed by their request descriptor.
pub struct ResponseCache {
    cache: Arc<CacheCore>,
    namespace: String,
    policy: TtlPolicy,
}

impl ResponseCache {
    pub fn new(cache: Arc<CacheCore>, namespace: impl Into<String>, policy: TtlPolicy) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            policy,
        }
    }

    /// Returns the cached response for `request`, or runs `load` and caches
    /// its result under tags and a TTL derived from the response itself.
    pub async fn fetch<E, F, Fut>(
        &self,
        request: &RequestDescriptor,
        category: Option<&str>,
        load: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let key = request.cache_key();
        if let Some(hit) = self.cache.get::<Value>(&self.namespace, &key).await {
            return Ok(hit);
        }

        let response = load().await?;
        let ttl = self.policy.compute_ttl(category, content_depth(&response));
        let tags: Vec<String> = extract_tags(request, &response).into_iter().collect();
        debug!(key = %key, ttl, tags = tags.len(), "Caching response");
        self.cache
            .set(&self.namespace, &key, &response, Some(ttl), &tags)
            .await;
        Ok(response)
    }

    /// Drops the cached response for `request`.
    pub async fn evict(&self, request: &RequestDescriptor) -> bool {
        self.cache.delete(&self.namespace, &request.cache_key()).await
    }
}
