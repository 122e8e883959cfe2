//! In-process Store Module
//!
//! A `StoreClient` backed by a HashMap with TTL expiration and volatile-LRU
//! eviction: at capacity only string keys that carry a TTL are evicted. Sets
//! (tag and session indexes) and persistent keys (configuration documents)
//! are never dropped to make room; the write is refused instead.
//! Used as the development backend, by the binary when no remote store is
//! wired in, and by the test suite. Failure injection (`set_offline`,
//! `with_latency`) lets tests exercise the engine's fail-open paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::clock::current_timestamp_ms;
use crate::error::{StoreError, StoreResult};
use crate::lock::mutex_lock;
use crate::store::client::{ScanPage, StoreClient, StoreInfo, Subscription, TTL_MISSING, TTL_PERSISTENT};
use crate::store::entry::{StoreEntry, StoredValue};
use crate::store::lru::LruTracker;
use crate::store::pattern::GlobPattern;

/// Buffered messages per pub/sub channel before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 256;

// == Keyspace ==
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, StoreEntry>,
    lru: LruTracker,
    evictions: u64,
}

impl Keyspace {
    /// Returns the live entry for `key`, dropping it first if it expired.
    fn live(&mut self, key: &str) -> Option<&mut StoreEntry> {
        if self.entries.get(key).is_some_and(StoreEntry::is_expired) {
            self.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
        }
        removed
    }

    /// Inserts an entry. At capacity the least recently used expiring
    /// string is evicted; when there is none the write fails.
    fn insert(&mut self, key: &str, entry: StoreEntry, max_entries: usize) -> StoreResult<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= max_entries {
            let now = current_timestamp_ms();
            let entries = &self.entries;
            let victim = self.lru.evict_oldest_where(|candidate| {
                entries.get(candidate).is_some_and(|e| e.is_expired_at(now) || e.is_volatile())
            });
            let Some(evicted) = victim else {
                warn!(key, max_entries, "Store full and no volatile key to evict");
                return Err(StoreError::OutOfMemory(key.to_string()));
            };
            self.entries.remove(&evicted);
            self.evictions += 1;
            debug!(key = %evicted, "Evicted least recently used key");
        }
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
        Ok(())
    }
}

// == Memory Store ==
/// In-process key/value store with string and set values.
#[derive(Debug)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    max_entries: usize,
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store that holds at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            channels: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            offline: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Adds an artificial delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn round_trip(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store offline".to_string()));
        }
        Ok(())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut keyspace = self.keyspace.write().await;
        let now = current_timestamp_ms();
        let expired: Vec<String> = keyspace
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            keyspace.remove(key);
        }
        expired.len()
    }

    /// Number of physically present entries, expired or not.
    pub async fn len(&self) -> usize {
        self.keyspace.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = mutex_lock(&self.channels, "memory_store.sender");
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        let value = match keyspace.live(key) {
            Some(entry) => match &entry.value {
                StoredValue::Str(value) => value.clone(),
                StoredValue::Set(_) => return Err(StoreError::WrongType(key.to_string())),
            },
            None => return Ok(None),
        };
        keyspace.lru.touch(key);
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        self.round_trip().await?;
        let entry = StoreEntry::new(StoredValue::Str(value.to_string()), ttl_seconds);
        self.keyspace
            .write()
            .await
            .insert(key, entry, self.max_entries)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        let mut removed = 0;
        for key in keys {
            if keyspace.live(key).is_some() && keyspace.remove(key) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.round_trip().await?;
        Ok(self.keyspace.write().await.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        Ok(match keyspace.live(key) {
            Some(entry) => entry
                .ttl_remaining()
                .map_or(TTL_PERSISTENT, |secs| secs as i64),
            None => TTL_MISSING,
        })
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        match keyspace.live(key) {
            Some(entry) => {
                entry.expire_in(ttl_seconds);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.round_trip().await?;
        let glob = GlobPattern::new(pattern);
        let keyspace = self.keyspace.read().await;
        let now = current_timestamp_ms();

        let mut live: Vec<&String> = keyspace
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key)
            .collect();
        live.sort();

        let start = (cursor as usize).min(live.len());
        let end = start.saturating_add(count.max(1)).min(live.len());
        let keys = live[start..end]
            .iter()
            .filter(|key| glob.matches(key))
            .map(|key| key.to_string())
            .collect();
        let next = if end >= live.len() { 0 } else { end as u64 };

        Ok(ScanPage { cursor: next, keys })
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        if let Some(entry) = keyspace.live(key) {
            let StoredValue::Set(set) = &mut entry.value else {
                return Err(StoreError::WrongType(key.to_string()));
            };
            let added = members.iter().filter(|m| set.insert((*m).clone())).count();
            keyspace.lru.touch(key);
            return Ok(added as u64);
        }

        let set: HashSet<String> = members.iter().cloned().collect();
        let added = set.len() as u64;
        keyspace.insert(key, StoreEntry::new(StoredValue::Set(set), None), self.max_entries)?;
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        let (removed, emptied) = match keyspace.live(key) {
            Some(entry) => {
                let StoredValue::Set(set) = &mut entry.value else {
                    return Err(StoreError::WrongType(key.to_string()));
                };
                let removed = members.iter().filter(|m| set.remove(*m)).count();
                (removed as u64, set.is_empty())
            }
            None => (0, false),
        };
        if emptied {
            keyspace.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.write().await;
        match keyspace.live(key) {
            Some(entry) => match &entry.value {
                StoredValue::Set(set) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    Ok(members)
                }
                StoredValue::Str(_) => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<u64> {
        self.round_trip().await?;
        // send() only fails when nobody is listening.
        Ok(self
            .sender(channel)
            .send(message.to_string())
            .map_or(0, |receivers| receivers as u64))
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.round_trip().await?;
        Ok(Subscription::new(channel, self.sender(channel).subscribe()))
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        self.round_trip().await?;
        let keyspace = self.keyspace.read().await;
        let used_memory_bytes = keyspace
            .entries
            .iter()
            .map(|(key, entry)| (key.len() + entry.value.size_bytes()) as u64)
            .sum();
        let subscribers: usize = mutex_lock(&self.channels, "memory_store.info")
            .values()
            .map(broadcast::Sender::receiver_count)
            .sum();

        Ok(StoreInfo {
            used_memory_bytes,
            connected_clients: 1 + subscribers as u64,
            evicted_keys: keyspace.evictions,
            total_keys: keyspace.entries.len() as u64,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.round_trip().await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new(100);

        store.set("key1", "value1", None).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));

        assert_eq!(store.del(&keys(&["key1", "missing"])).await.unwrap(), 1);
        assert_eq!(store.get("key1").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = MemoryStore::new(100);
        store.set("short", "v", Some(1)).await.unwrap();
        assert!(store.exists("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.ttl("short").await.unwrap(), TTL_MISSING);
    }

    #[tokio::test]
    async fn test_ttl_and_expire() {
        let store = MemoryStore::new(100);
        store.set("forever", "v", None).await.unwrap();
        assert_eq!(store.ttl("forever").await.unwrap(), TTL_PERSISTENT);

        assert!(store.expire("forever", 30).await.unwrap());
        let ttl = store.ttl("forever").await.unwrap();
        assert!((29..=30).contains(&ttl));

        assert!(!store.expire("missing", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let store = MemoryStore::new(3);

        store.set("key1", "v", Some(60)).await.unwrap();
        store.set("key2", "v", Some(60)).await.unwrap();
        store.set("key3", "v", Some(60)).await.unwrap();
        // Touch key1 so key2 becomes the eviction victim
        store.get("key1").await.unwrap();
        store.set("key4", "v", Some(60)).await.unwrap();

        assert_eq!(store.len().await, 3);
        assert!(store.exists("key1").await.unwrap());
        assert!(!store.exists("key2").await.unwrap());
        assert_eq!(store.info().await.unwrap().evicted_keys, 1);
    }

    #[tokio::test]
    async fn test_eviction_spares_sets_and_persistent_keys() {
        let store = MemoryStore::new(3);
        store.sadd("tag:t", &keys(&["k1"])).await.unwrap();
        store.expire("tag:t", 60).await.unwrap();
        store.set("config:rules", "[]", None).await.unwrap();
        store.set("k1", "v", Some(60)).await.unwrap();

        // The tag set and the document are older, but only k1 may go.
        store.set("k2", "v", Some(60)).await.unwrap();
        assert!(!store.exists("k1").await.unwrap());
        assert_eq!(store.smembers("tag:t").await.unwrap(), keys(&["k1"]));
        assert_eq!(store.get("config:rules").await.unwrap(), Some("[]".to_string()));
        assert_eq!(store.info().await.unwrap().evicted_keys, 1);
    }

    #[tokio::test]
    async fn test_full_store_without_volatile_keys_refuses_writes() {
        let store = MemoryStore::new(2);
        store.sadd("tag:t", &keys(&["k1"])).await.unwrap();
        store.set("config:rules", "[]", None).await.unwrap();

        assert!(matches!(store.set("k1", "v", Some(60)).await, Err(StoreError::OutOfMemory(_))));
        assert!(matches!(store.sadd("tag:u", &keys(&["k1"])).await, Err(StoreError::OutOfMemory(_))));
        // Updating a key that already exists needs no room.
        store.set("config:rules", "[1]", None).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.info().await.unwrap().evicted_keys, 0);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new(100);

        assert_eq!(store.sadd("tags", &keys(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.sadd("tags", &keys(&["b", "c"])).await.unwrap(), 1);
        assert_eq!(store.smembers("tags").await.unwrap(), keys(&["a", "b", "c"]));

        assert_eq!(store.srem("tags", &keys(&["a", "b", "c"])).await.unwrap(), 3);
        assert!(!store.exists("tags").await.unwrap(), "emptied set disappears");
        assert!(store.smembers("tags").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_errors() {
        let store = MemoryStore::new(100);
        store.set("plain", "v", None).await.unwrap();
        store.sadd("set", &keys(&["m"])).await.unwrap();

        assert!(matches!(store.sadd("plain", &keys(&["x"])).await, Err(StoreError::WrongType(_))));
        assert!(matches!(store.get("set").await, Err(StoreError::WrongType(_))));
    }

    #[tokio::test]
    async fn test_scan_walks_cursor() {
        let store = MemoryStore::new(100);
        for i in 0..25 {
            store.set(&format!("cache:user:{i}"), "v", None).await.unwrap();
        }
        store.set("other:1", "v", None).await.unwrap();

        let mut found = Vec::new();
        let mut cursor = 0;
        let mut pages = 0;
        loop {
            let page = store.scan(cursor, "cache:user:*", 10).await.unwrap();
            found.extend(page.keys);
            pages += 1;
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }

        assert_eq!(found.len(), 25);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let store = MemoryStore::new(100);
        assert_eq!(store.publish("events", "nobody").await.unwrap(), 0);

        let mut sub = store.subscribe("events").await.unwrap();
        assert_eq!(store.publish("events", "hello").await.unwrap(), 1);
        assert_eq!(sub.next_message().await, Some("hello".to_string()));
        assert_eq!(sub.channel(), "events");
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new(100);
        store.set_offline(true);

        assert!(matches!(store.ping().await, Err(StoreError::Connection(_))));
        assert!(store.get("k").await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = MemoryStore::new(100);
        store.set("key1", "v", Some(1)).await.unwrap();
        store.set("key2", "v", Some(10)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_info_reports_keys_and_memory() {
        let store = MemoryStore::new(100);
        store.set("ab", "cdef", None).await.unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.total_keys, 1);
        assert_eq!(info.used_memory_bytes, 6);
        assert_eq!(info.connected_clients, 1);
    }
}
