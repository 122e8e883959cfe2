//! Cache Core
//!
//! Namespaced get/set/delete over the remote store, the tag index used for
//! bulk invalidation, and hit/miss/latency statistics.
//!
//! The cache is an optional accelerator: every store failure is logged,
//! counted, and turned into a miss or a no-op. Nothing here returns a
//! transport error to callers.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::keys::KeyBuilder;
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::clock::current_timestamp_ms;
use crate::config::CacheSettings;
use crate::error::{CacheError, Result};
use crate::store::StoreClient;

// == Cache Entry ==
/// The record physically stored for every cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub namespace: String,
    pub key: String,
    pub value: Value,
    pub ttl_seconds: u64,
    pub stored_at_epoch_ms: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    /// Milliseconds of logical lifetime left; zero or less means absent.
    pub fn remaining_ms(&self, now_ms: u64) -> i64 {
        let elapsed = now_ms.saturating_sub(self.stored_at_epoch_ms) as i64;
        (self.ttl_seconds as i64) * 1000 - elapsed
    }

    pub fn is_live(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) > 0
    }

    /// Remaining lifetime rounded up to whole seconds.
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        let ms = self.remaining_ms(now_ms).max(0) as u64;
        ms.div_ceil(1000)
    }
}

// == Cache Core ==
/// Tag-indexed cache over an injected store handle.
pub struct CacheCore {
    store: Arc<dyn StoreClient>,
    keys: KeyBuilder,
    settings: CacheSettings,
    stats: StatsRecorder,
}

impl CacheCore {
    // == Constructor ==
    pub fn new(store: Arc<dyn StoreClient>, settings: CacheSettings) -> Self {
        Self {
            keys: KeyBuilder::new(settings.key_prefix.clone(), settings.max_key_length),
            store,
            settings,
            stats: StatsRecorder::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    // == Get ==
    /// Returns the cached value, or `None` on miss, expiry, decode failure
    /// or store failure.
    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let started = Instant::now();
        let entry = self.get_entry(namespace, key).await;
        let value = entry.and_then(|entry| match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(namespace, key, error = %err, "Cached value has unexpected shape");
                None
            }
        });

        match value {
            Some(value) => {
                self.stats.record_hit(started.elapsed());
                debug!(namespace, key, "cache hit");
                Some(value)
            }
            None => {
                self.stats.record_miss(started.elapsed());
                debug!(namespace, key, "cache miss");
                None
            }
        }
    }

    /// Returns the whole live entry without touching hit/miss counters.
    pub async fn get_entry(&self, namespace: &str, key: &str) -> Option<CacheEntry> {
        let full_key = self.keys.entry_key(namespace, key);
        match self.fetch_entry(&full_key).await {
            Ok(entry) => entry,
            Err(err) => {
                self.fail_open("get", &full_key, &err);
                None
            }
        }
    }

    async fn fetch_entry(&self, full_key: &str) -> Result<Option<CacheEntry>> {
        let Some(raw) = self.store.get(full_key).await? else {
            return Ok(None);
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = full_key, error = %err, "Dropping undecodable cache record");
                self.store.del(&[full_key.to_string()]).await?;
                return Ok(None);
            }
        };

        if !entry.is_live(current_timestamp_ms()) {
            // Logically expired even if the store has not evicted it yet.
            self.store.del(&[full_key.to_string()]).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    // == Set ==
    /// Writes `value` under `namespace:key` and indexes it under `tags`.
    ///
    /// `ttl_seconds` of `None` (or zero) uses the configured default. Returns
    /// false when the value is rejected or the store fails.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
        tags: &[String],
    ) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        match self.try_set(namespace, key, &full_key, value, ttl_seconds, tags).await {
            Ok(()) => {
                self.stats.record_set();
                true
            }
            Err(CacheError::Validation(reason)) => {
                warn!(key = %full_key, reason = %reason, "Rejected cache write");
                false
            }
            Err(err) => {
                self.fail_open("set", &full_key, &err);
                false
            }
        }
    }

    async fn try_set<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &str,
        full_key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
        tags: &[String],
    ) -> Result<()> {
        if namespace.is_empty() || key.is_empty() {
            return Err(CacheError::Validation("namespace and key must be non-empty".to_string()));
        }

        let ttl = match ttl_seconds {
            Some(ttl) if ttl > 0 => ttl,
            _ => self.settings.default_ttl,
        };
        let entry = CacheEntry {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: serde_json::to_value(value)?,
            ttl_seconds: ttl,
            stored_at_epoch_ms: current_timestamp_ms(),
            tags: tags.iter().filter(|t| !t.is_empty()).cloned().collect(),
        };
        let encoded = serde_json::to_string(&entry)?;
        if encoded.len() > self.settings.max_value_size {
            return Err(CacheError::Validation(format!(
                "value of {} bytes exceeds maximum of {} bytes",
                encoded.len(),
                self.settings.max_value_size
            )));
        }

        // Tags the previous value carried but this one does not.
        let stale_tags: Vec<String> = match self.fetch_entry(full_key).await {
            Ok(Some(previous)) => previous.tags.difference(&entry.tags).cloned().collect(),
            _ => Vec::new(),
        };

        self.store.set(full_key, &encoded, Some(ttl)).await?;

        if let Err(err) = self.index_tags(full_key, &entry.tags, ttl).await {
            // An entry missing from its tag sets would survive invalidation.
            let _ = self.store.del(&[full_key.to_string()]).await;
            return Err(err);
        }
        self.unindex_tags(full_key, &stale_tags).await;
        Ok(())
    }

    /// Adds `full_key` to each tag set and raises the set's TTL to cover it.
    async fn index_tags(&self, full_key: &str, tags: &BTreeSet<String>, ttl: u64) -> Result<()> {
        let member = [full_key.to_string()];
        for tag in tags {
            let tag_key = self.keys.tag_key(tag);
            self.store.sadd(&tag_key, &member).await?;
            // Fresh sets come back persistent (-1) and always get a TTL.
            if self.store.ttl(&tag_key).await? < ttl as i64 {
                self.store.expire(&tag_key, ttl).await?;
            }
        }
        Ok(())
    }

    /// Best-effort removal of `full_key` from tag sets; drift left behind is
    /// harmless and reconciled on the next invalidation.
    async fn unindex_tags(&self, full_key: &str, tags: &[String]) {
        let member = [full_key.to_string()];
        for tag in tags {
            if let Err(err) = self.store.srem(&self.keys.tag_key(tag), &member).await {
                self.stats.record_error();
                debug!(tag = %tag, key = full_key, error = %err, "Tag index cleanup skipped");
            }
        }
    }

    // == Delete ==
    /// Removes an entry and scrubs it from the tag sets it listed. Returns
    /// true when a live entry was removed.
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        let tags: Vec<String> = match self.fetch_entry(&full_key).await {
            Ok(Some(entry)) => entry.tags.into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                self.fail_open("delete", &full_key, &err);
                return false;
            }
        };

        match self.store.del(&[full_key.clone()]).await {
            Ok(removed) => {
                self.unindex_tags(&full_key, &tags).await;
                self.stats.record_deletes(removed);
                removed > 0
            }
            Err(err) => {
                self.fail_open("delete", &full_key, &err.into());
                false
            }
        }
    }

    // == Exists ==
    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        match self.store.exists(&full_key).await {
            Ok(found) => found,
            Err(err) => {
                self.fail_open("exists", &full_key, &err.into());
                false
            }
        }
    }

    // == TTL ==
    /// Seconds the entry has left, or -1 if it is absent or unknown.
    pub async fn ttl(&self, namespace: &str, key: &str) -> i64 {
        let full_key = self.keys.entry_key(namespace, key);
        match self.store.ttl(&full_key).await {
            Ok(ttl) if ttl >= 0 => ttl,
            Ok(_) => -1,
            Err(err) => {
                self.fail_open("ttl", &full_key, &err.into());
                -1
            }
        }
    }

    // == Extend ==
    /// Adds `extra_seconds` to a live entry's lifetime.
    pub async fn extend(&self, namespace: &str, key: &str, extra_seconds: u64) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        match self.try_extend(&full_key, extra_seconds).await {
            Ok(extended) => extended,
            Err(err) => {
                self.fail_open("extend", &full_key, &err);
                false
            }
        }
    }

    async fn try_extend(&self, full_key: &str, extra_seconds: u64) -> Result<bool> {
        let Some(mut entry) = self.fetch_entry(full_key).await? else {
            return Ok(false);
        };
        entry.ttl_seconds += extra_seconds;
        let remaining = entry.remaining_secs(current_timestamp_ms()).max(1);
        self.store
            .set(full_key, &serde_json::to_string(&entry)?, Some(remaining))
            .await?;
        self.index_tags(full_key, &entry.tags, remaining).await?;
        Ok(true)
    }

    // == Invalidate By Pattern ==
    /// Deletes every entry whose key (relative to the prefix) matches `glob`.
    ///
    /// Keys are enumerated with the cursor scan before anything is deleted,
    /// so deletions cannot shift the cursor past unvisited keys.
    pub async fn invalidate_by_pattern(&self, glob: &str) -> u64 {
        let pattern = self.keys.pattern(glob);
        let mut matched = Vec::new();
        let mut cursor = 0;
        loop {
            match self.store.scan(cursor, &pattern, self.settings.scan_batch).await {
                Ok(page) => {
                    matched.extend(page.keys);
                    if page.cursor == 0 {
                        break;
                    }
                    cursor = page.cursor;
                }
                Err(err) => {
                    self.fail_open("scan", &pattern, &err.into());
                    break;
                }
            }
        }

        let removed = self.delete_keys(&matched).await;
        info!(pattern = %pattern, removed, "Invalidated by pattern");
        self.announce("pattern", glob, removed).await;
        removed
    }

    // == Invalidate By Tag ==
    /// Deletes every entry indexed under `tag` and the tag set itself.
    /// Returns the number of entries actually removed; repeating the call is
    /// a no-op returning 0.
    pub async fn invalidate_by_tag(&self, tag: &str) -> u64 {
        let tag_key = self.keys.tag_key(tag);
        let members = match self.store.smembers(&tag_key).await {
            Ok(members) => members,
            Err(err) => {
                self.fail_open("smembers", &tag_key, &err.into());
                return 0;
            }
        };
        if members.is_empty() {
            return 0;
        }

        let removed = self.delete_keys(&members).await;
        if let Err(err) = self.store.del(&[tag_key.clone()]).await {
            self.fail_open("del", &tag_key, &err.into());
        }
        info!(tag, removed, "Invalidated by tag");
        self.announce("tag", tag, removed).await;
        removed
    }

    async fn delete_keys(&self, keys: &[String]) -> u64 {
        let mut removed = 0;
        for chunk in keys.chunks(self.settings.scan_batch.max(1)) {
            match self.store.del(chunk).await {
                Ok(count) => removed += count,
                Err(err) => self.fail_open("del", &chunk[0], &err.into()),
            }
        }
        self.stats.record_deletes(removed);
        removed
    }

    async fn announce(&self, kind: &str, value: &str, removed: u64) {
        if !self.settings.broadcast_invalidations || removed == 0 {
            return;
        }
        let message = json!({ "kind": kind, "value": value, "removed": removed }).to_string();
        if let Err(err) = self
            .store
            .publish(&self.keys.invalidation_channel(), &message)
            .await
        {
            debug!(error = %err, "Invalidation broadcast skipped");
        }
    }

    // == Read-through ==
    /// Returns the cached value, or runs `load`, caches its output and
    /// returns it. Loader errors are passed through untouched.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        ttl_seconds: Option<u64>,
        tags: &[String],
        load: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(hit) = self.get(namespace, key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.set(namespace, key, &value, ttl_seconds, tags).await;
        Ok(value)
    }

    // == Member sets ==
    /// Adds `member` to the set at `namespace:key`, keeping the set alive for
    /// at least `ttl_seconds`.
    pub async fn add_to_set(&self, namespace: &str, key: &str, member: &str, ttl_seconds: u64) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        let result: Result<()> = async {
            self.store.sadd(&full_key, &[member.to_string()]).await?;
            if self.store.ttl(&full_key).await? < ttl_seconds as i64 {
                self.store.expire(&full_key, ttl_seconds).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                self.fail_open("sadd", &full_key, &err);
                false
            }
        }
    }

    /// Members of the set at `namespace:key`; empty on failure.
    pub async fn set_members(&self, namespace: &str, key: &str) -> Vec<String> {
        let full_key = self.keys.entry_key(namespace, key);
        match self.store.smembers(&full_key).await {
            Ok(members) => members,
            Err(err) => {
                self.fail_open("smembers", &full_key, &err.into());
                Vec::new()
            }
        }
    }

    /// Removes `member`; returns false only on store failure.
    pub async fn remove_from_set(&self, namespace: &str, key: &str, member: &str) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        match self.store.srem(&full_key, &[member.to_string()]).await {
            Ok(_) => true,
            Err(err) => {
                self.fail_open("srem", &full_key, &err.into());
                false
            }
        }
    }

    /// Deletes the set at `namespace:key` outright.
    pub async fn remove_set(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.keys.entry_key(namespace, key);
        match self.store.del(&[full_key.clone()]).await {
            Ok(_) => true,
            Err(err) => {
                self.fail_open("del", &full_key, &err.into());
                false
            }
        }
    }

    // == Persisted configuration ==
    /// Stores a configuration document without expiry.
    pub async fn save_document<T: Serialize + ?Sized>(&self, name: &str, document: &T) -> bool {
        let key = self.keys.config_key(name);
        let result: Result<()> = async {
            let encoded = serde_json::to_string(document)?;
            self.store.set(&key, &encoded, None).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                self.fail_open("save_document", &key, &err);
                false
            }
        }
    }

    /// Loads a configuration document written by [`Self::save_document`].
    pub async fn load_document<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = self.keys.config_key(name);
        let result: Result<Option<T>> = async {
            match self.store.get(&key).await? {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        }
        .await;

        result.unwrap_or_else(|err| {
            self.fail_open("load_document", &key, &err);
            None
        })
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn fail_open(&self, op: &'static str, key: &str, err: &CacheError) {
        if matches!(err, CacheError::Store(_)) {
            self.stats.record_error();
        }
        warn!(op, key, error = %err, "Cache operation degraded");
    }
}
