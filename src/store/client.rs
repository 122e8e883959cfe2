//! Remote store contract.
//!
//! The engine treats the backing key/value store as an external collaborator
//! with its own failure modes. Everything the engine needs from it goes
//! through this trait; handles are constructed explicitly and injected as
//! `Arc<dyn StoreClient>`.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::StoreResult;

/// TTL reply for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// TTL reply for a key that exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// One page of a cursor-based key scan. A returned cursor of `0` means the
/// iteration is complete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Fields of the store's `INFO` reply the engine cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreInfo {
    pub used_memory_bytes: u64,
    pub connected_clients: u64,
    pub evicted_keys: u64,
    pub total_keys: u64,
}

/// Live subscription to a pub/sub channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message. Lagged messages are skipped; `None` once
    /// the channel is closed.
    pub async fn next_message(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Narrow interface over the remote key/value store.
///
/// Every method is a single round-trip and may fail independently of the
/// caller's logic; callers decide how to degrade.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// `SET key value [EX ttl]`
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()>;

    /// `DEL key [key ...]`, returning the number of keys removed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    /// `EXISTS key`
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// `TTL key`: seconds remaining, [`TTL_PERSISTENT`] or [`TTL_MISSING`].
    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// `EXPIRE key seconds`, false when the key does not exist.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool>;

    /// `SCAN cursor MATCH pattern COUNT count`
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// `SADD key member [member ...]`, returning the number of new members.
    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64>;

    /// `SREM key member [member ...]`, returning the number removed. An
    /// emptied set disappears.
    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<u64>;

    /// `SMEMBERS key`
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// `PUBLISH channel message`, returning the number of receivers.
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64>;

    /// `SUBSCRIBE channel`
    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;

    /// `INFO`
    async fn info(&self) -> StoreResult<StoreInfo>;

    /// `PING`
    async fn ping(&self) -> StoreResult<()>;
}
