//! Store decorators composed at construction time.
//!
//! `TimeoutLayer` bounds every round-trip so a slow store degrades to a
//! failure instead of a hang. `TracingLayer` emits a debug event per call
//! and a warning per failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::client::{ScanPage, StoreClient, StoreInfo, Subscription};

// == Timeout Layer ==
/// Fails any store call that does not complete within `timeout`.
pub struct TimeoutLayer<S> {
    inner: S,
    timeout: Duration,
}

impl<S: StoreClient> TimeoutLayer<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for TimeoutLayer<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        self.bounded(self.inner.set(key, value, ttl_seconds)).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.bounded(self.inner.del(keys)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.bounded(self.inner.exists(key)).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.bounded(self.inner.ttl(key)).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        self.bounded(self.inner.expire(key, ttl_seconds)).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.bounded(self.inner.scan(cursor, pattern, count)).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.bounded(self.inner.sadd(key, members)).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.bounded(self.inner.srem(key, members)).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.bounded(self.inner.smembers(key)).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        self.bounded(self.inner.publish(channel, message)).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.bounded(self.inner.subscribe(channel)).await
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        self.bounded(self.inner.info()).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.bounded(self.inner.ping()).await
    }
}

// == Tracing Layer ==
/// Logs every store call with its latency; failures are logged at warn.
pub struct TracingLayer<S> {
    inner: S,
}

impl<S: StoreClient> TracingLayer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    async fn traced<T>(
        &self,
        op: &'static str,
        target: &str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        let started = Instant::now();
        let result = call.await;
        let elapsed_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(_) => debug!(op, target, elapsed_us, "store call"),
            Err(err) => warn!(op, target, elapsed_us, error = %err, "store call failed"),
        }
        result
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for TracingLayer<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.traced("GET", key, self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        self.traced("SET", key, self.inner.set(key, value, ttl_seconds)).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        let target = keys.first().map(String::as_str).unwrap_or_default();
        self.traced("DEL", target, self.inner.del(keys)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.traced("EXISTS", key, self.inner.exists(key)).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.traced("TTL", key, self.inner.ttl(key)).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        self.traced("EXPIRE", key, self.inner.expire(key, ttl_seconds)).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.traced("SCAN", pattern, self.inner.scan(cursor, pattern, count)).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.traced("SADD", key, self.inner.sadd(key, members)).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.traced("SREM", key, self.inner.srem(key, members)).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.traced("SMEMBERS", key, self.inner.smembers(key)).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        self.traced("PUBLISH", channel, self.inner.publish(channel, message)).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.traced("SUBSCRIBE", channel, self.inner.subscribe(channel)).await
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        self.traced("INFO", "", self.inner.info()).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.traced("PING", "", self.inner.ping()).await
    }
}

// == Shared handles ==
// Lets a decorator wrap a store that other components also hold.
#[async_trait]
impl<S: StoreClient + ?Sized> StoreClient for Arc<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        (**self).set(key, value, ttl_seconds).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        (**self).del(keys).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        (**self).ttl(key).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        (**self).expire(key, ttl_seconds).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        (**self).scan(cursor, pattern, count).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        (**self).sadd(key, members).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        (**self).srem(key, members).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        (**self).smembers(key).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        (**self).publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        (**self).subscribe(channel).await
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        (**self).info().await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self).ping().await
    }
}
