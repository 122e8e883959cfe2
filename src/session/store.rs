//! Session Store
//!
//! Sessions live in the cache under the `session` namespace. A per-user set
//! in `user-sessions` indexes the ids of every session a user holds. Idle
//! timeouts are enforced when a session is read; there is no sweeper.
//!
//! Destroying a session leaves a short-lived marker in `session-revoked`.
//! Every write-back checks it afterwards, so a read racing a logout cannot
//! bring the session back.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::CacheCore;
use crate::clock::current_timestamp_ms;
use crate::config::SessionSettings;
use crate::session::record::{SessionData, SessionRecord, SessionUpdate};

const SESSION_NAMESPACE: &str = "session";
const USER_INDEX_NAMESPACE: &str = "user-sessions";
const REVOKED_NAMESPACE: &str = "session-revoked";

/// Floor for how long a revocation marker is kept.
const REVOCATION_MIN_SECS: u64 = 60;

/// Random bytes in every session id, rendered as 32 hex characters.
const SESSION_ID_ENTROPY_BYTES: usize = 16;

// == Session Store ==
pub struct SessionStore {
    cache: Arc<CacheCore>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(cache: Arc<CacheCore>, settings: SessionSettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // == Create ==
    /// Creates a session for `user_id` and returns its id, or `None` if the
    /// store could not take the write.
    ///
    /// The session lives for the longer of the configured default and `ttl`.
    pub async fn create_session(
        &self,
        user_id: &str,
        data: SessionData,
        ttl_seconds: Option<u64>,
    ) -> Option<String> {
        let ttl = ttl_seconds.unwrap_or(0).max(self.settings.default_ttl);
        let now = current_timestamp_ms();
        let record = SessionRecord {
            session_id: generate_session_id(now),
            user_id: user_id.to_string(),
            roles: data.roles,
            permissions: data.permissions,
            created_at_epoch_ms: now,
            last_activity_epoch_ms: now,
            metadata: data.metadata,
            ttl_seconds: ttl,
        };

        if !self.write(&record, ttl).await {
            return None;
        }
        if !self.index(&record, ttl).await {
            // An unindexed session would escape destroy_all_user_sessions.
            self.cache.delete(SESSION_NAMESPACE, &record.session_id).await;
            return None;
        }

        info!(user_id, session_id = %record.session_id, ttl, "Session created");
        Some(record.session_id)
    }

    // == Get ==
    /// Returns a live session, destroying it instead if it has been idle too
    /// long. With sliding expiration a successful read refreshes activity
    /// time and lifetime.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        let mut record = self.load_active(session_id).await?;
        if self.settings.sliding_expiration {
            record.last_activity_epoch_ms = current_timestamp_ms();
            let ttl = record.ttl_seconds.max(self.settings.default_ttl);
            if self.write(&record, ttl).await {
                self.index(&record, ttl).await;
            }
            if self.undo_if_revoked(&record).await {
                return None;
            }
        }
        Some(record)
    }

    // == Update ==
    /// Applies `update` to a live session without changing its expiry.
    pub async fn update_session(&self, session_id: &str, update: SessionUpdate) -> bool {
        let Some(mut record) = self.load_active(session_id).await else {
            return false;
        };
        update.apply(&mut record);
        record.last_activity_epoch_ms = current_timestamp_ms();

        let remaining = self.cache.ttl(SESSION_NAMESPACE, session_id).await;
        let ttl = if remaining > 0 { remaining as u64 } else { record.ttl_seconds };
        self.write(&record, ttl).await && !self.undo_if_revoked(&record).await
    }

    // == Destroy ==
    /// Deletes a session and its index membership. The user's index is
    /// removed once it has no members left.
    pub async fn destroy_session(&self, session_id: &str) -> bool {
        let user_id = self.load(session_id).await.map(|record| record.user_id);
        if user_id.is_some() {
            self.revoke(session_id).await;
        }
        let removed = self.cache.delete(SESSION_NAMESPACE, session_id).await;
        if let Some(user_id) = user_id {
            self.unindex(&user_id, session_id).await;
        }
        if removed {
            debug!(session_id, "Session destroyed");
        }
        removed
    }

    /// Destroys every session `user_id` holds and the index itself.
    /// A failed delete does not stop the rest; returns how many went.
    pub async fn destroy_all_user_sessions(&self, user_id: &str) -> usize {
        let session_ids = self.cache.set_members(USER_INDEX_NAMESPACE, user_id).await;
        let mut destroyed = 0;
        for session_id in &session_ids {
            self.revoke(session_id).await;
            if self.cache.delete(SESSION_NAMESPACE, session_id).await {
                destroyed += 1;
            } else {
                debug!(user_id, session_id = %session_id, "Session already gone or not deletable");
            }
        }
        self.cache.remove_set(USER_INDEX_NAMESPACE, user_id).await;
        info!(user_id, destroyed, "Destroyed all user sessions");
        destroyed
    }

    // == User Sessions ==
    /// Live sessions of `user_id`. Index members whose session has vanished
    /// or gone idle are pruned along the way.
    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<SessionRecord> {
        let session_ids = self.cache.set_members(USER_INDEX_NAMESPACE, user_id).await;
        let mut sessions = Vec::with_capacity(session_ids.len());
        for session_id in &session_ids {
            match self.load_active(session_id).await {
                Some(record) => sessions.push(record),
                None => self.unindex(user_id, session_id).await,
            }
        }
        sessions
    }

    // == Extend ==
    /// Adds `extra_seconds` to a live session and its index.
    pub async fn extend_session(&self, session_id: &str, extra_seconds: u64) -> bool {
        let Some(mut record) = self.load_active(session_id).await else {
            return false;
        };
        let remaining = self.cache.ttl(SESSION_NAMESPACE, session_id).await.max(0) as u64;
        let ttl = remaining + extra_seconds;
        // Sliding reads refresh back to the extended lifetime.
        record.ttl_seconds += extra_seconds;
        if !self.write(&record, ttl).await {
            return false;
        }
        self.index(&record, ttl).await;
        !self.undo_if_revoked(&record).await
    }

    // == Internals ==
    async fn load(&self, session_id: &str) -> Option<SessionRecord> {
        let entry = self.cache.get_entry(SESSION_NAMESPACE, session_id).await?;
        match serde_json::from_value(entry.value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(session_id, error = %err, "Discarding malformed session record");
                self.cache.delete(SESSION_NAMESPACE, session_id).await;
                None
            }
        }
    }

    /// Loads a session, destroying it if the idle timeout has passed.
    async fn load_active(&self, session_id: &str) -> Option<SessionRecord> {
        let record = self.load(session_id).await?;
        let idle_ms = record.idle_ms(current_timestamp_ms());
        if idle_ms > self.settings.max_idle_seconds * 1000 {
            info!(session_id, idle_ms, "Session idle timeout");
            self.cache.delete(SESSION_NAMESPACE, session_id).await;
            self.unindex(&record.user_id, session_id).await;
            return None;
        }
        Some(record)
    }

    async fn write(&self, record: &SessionRecord, ttl: u64) -> bool {
        self.cache
            .set(SESSION_NAMESPACE, &record.session_id, record, Some(ttl), &[])
            .await
    }

    /// Adds the session to its user's index, which outlives the session by
    /// the configured margin.
    async fn index(&self, record: &SessionRecord, ttl: u64) -> bool {
        self.cache
            .add_to_set(
                USER_INDEX_NAMESPACE,
                &record.user_id,
                &record.session_id,
                ttl + self.settings.index_ttl_margin,
            )
            .await
    }

    /// Marks a session as destroyed. Written before the delete so that any
    /// write-back landing afterwards finds it.
    async fn revoke(&self, session_id: &str) {
        let ttl = self
            .cache
            .settings()
            .store_timeout()
            .as_secs()
            .saturating_mul(4)
            .max(REVOCATION_MIN_SECS);
        if !self.cache.set(REVOKED_NAMESPACE, session_id, &true, Some(ttl), &[]).await {
            warn!(session_id, "Revocation marker not written");
        }
    }

    /// Called after writing a session back. If it was destroyed meanwhile,
    /// deletes the rewritten record and index membership again.
    async fn undo_if_revoked(&self, record: &SessionRecord) -> bool {
        if !self.cache.exists(REVOKED_NAMESPACE, &record.session_id).await {
            return false;
        }
        debug!(session_id = %record.session_id, "Write-back raced a destroy, removing again");
        self.cache.delete(SESSION_NAMESPACE, &record.session_id).await;
        self.unindex(&record.user_id, &record.session_id).await;
        true
    }

    async fn unindex(&self, user_id: &str, session_id: &str) {
        self.cache
            .remove_from_set(USER_INDEX_NAMESPACE, user_id, session_id)
            .await;
        if self.cache.set_members(USER_INDEX_NAMESPACE, user_id).await.is_empty() {
            self.cache.remove_set(USER_INDEX_NAMESPACE, user_id).await;
        }
    }
}

/// Base-36 creation time, an underscore, then 32 random hex characters.
fn generate_session_id(now_ms: u64) -> String {
    let entropy: [u8; SESSION_ID_ENTROPY_BYTES] = rand::random();
    format!("{}_{}", to_base36(now_ms), hex::encode(entropy))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
