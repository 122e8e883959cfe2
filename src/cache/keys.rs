//! Store key derivation.
//!
//! Entry keys read `{prefix}:{namespace}:{derived}`. Short keys stay human
//! readable with store-unsafe characters replaced; keys longer than the
//! configured bound are replaced by a SHA-256 digest so every store key has
//! a bounded length.

use sha2::{Digest, Sha256};

/// Builds every key the engine writes to the store.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
    max_key_length: usize,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>, max_key_length: usize) -> Self {
        Self {
            prefix: sanitize(&prefix.into()),
            max_key_length: max_key_length.max(16),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully-qualified key of a cache entry.
    pub fn entry_key(&self, namespace: &str, key: &str) -> String {
        format!(
            "{}:{}:{}",
            self.prefix,
            sanitize(namespace),
            derive_key(namespace, key, self.max_key_length)
        )
    }

    /// Key of the member set holding every entry that carries `tag`.
    pub fn tag_key(&self, tag: &str) -> String {
        format!("tag:{}:{}", self.prefix, tag)
    }

    /// Scan pattern for a glob relative to the entry keyspace.
    pub fn pattern(&self, glob: &str) -> String {
        format!("{}:{}", self.prefix, glob)
    }

    /// Key of a persisted configuration document.
    pub fn config_key(&self, name: &str) -> String {
        format!("config:{}:{}", self.prefix, name)
    }

    /// Channel on which bulk invalidations are announced.
    pub fn invalidation_channel(&self) -> String {
        format!("{}:invalidations", self.prefix)
    }
}

/// Derives the store-safe final key segment.
pub fn derive_key(namespace: &str, key: &str, max_len: usize) -> String {
    if key.len() <= max_len {
        return sanitize(key);
    }
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(key.trim().as_bytes());
    format!("h:{}", hex::encode(hasher.finalize()))
}

/// Replaces whitespace, glob metacharacters and anything else outside
/// `[A-Za-z0-9:_.@-]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
