//! Store Entry Module
//!
//! A single record in the in-process store: a string or a set of members,
//! with an optional absolute expiry.

use std::collections::HashSet;

use crate::clock::current_timestamp_ms;

// == Stored Value ==
/// Payload kinds the store understands.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    /// Plain string value (`GET`/`SET`)
    Str(String),
    /// Unordered member set (`SADD`/`SREM`/`SMEMBERS`)
    Set(HashSet<String>),
}

impl StoredValue {
    /// Approximate heap footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            StoredValue::Str(s) => s.len(),
            StoredValue::Set(members) => members.iter().map(String::len).sum(),
        }
    }
}

// == Store Entry ==
/// Represents a single store entry with value and expiry metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored value
    pub value: StoredValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL in seconds.
    pub fn new(value: StoredValue, ttl_seconds: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: ttl_seconds.map(|ttl| now + ttl * 1000),
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// A string with an expiry, the only kind the store may evict.
    pub fn is_volatile(&self) -> bool {
        matches!(self.value, StoredValue::Str(_)) && self.expires_at.is_some()
    }

    // == Expire ==
    /// Resets the expiry to `ttl_seconds` from now.
    pub fn expire_in(&mut self, ttl_seconds: u64) {
        self.expires_at = Some(current_timestamp_ms() + ttl_seconds * 1000);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    /// Returns remaining TTL in seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms / 1000)
    }
}
