//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache core's guarantees over generated keys,
//! values and tag assignments.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cache::keys::{derive_key, sanitize};
use crate::cache::CacheCore;
use crate::config::CacheSettings;
use crate::store::MemoryStore;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 1_000;
const TEST_TTL: Option<u64> = Some(300);

fn new_core() -> CacheCore {
    CacheCore::new(Arc::new(MemoryStore::new(TEST_MAX_ENTRIES)), CacheSettings::default())
}

// == Strategies ==
/// Generates cache keys made of characters that survive sanitizing
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,48}"
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,128}"
}

fn tag_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["profile", "user:1", "user:2", "list", "catalog"])
        .prop_map(str::to_string)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Storing a value and reading it back before expiry returns the same value.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let cache = new_core();
        let retrieved: Option<String> = tokio_test::block_on(async {
            cache.set("prop", &key, &value, TEST_TTL, &[]).await;
            cache.get("prop", &key).await
        });
        prop_assert_eq!(retrieved, Some(value));
    }

    // Hit and miss counters match a model of what the cache holds.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let cache = new_core();
        let mut model: HashMap<String, String> = HashMap::new();
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set("prop", &key, &value, TEST_TTL, &[]).await;
                        model.insert(key, value);
                    }
                    CacheOp::Get { key } => {
                        let found: Option<String> = cache.get("prop", &key).await;
                        assert_eq!(found.as_ref(), model.get(&key));
                        if found.is_some() {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                    }
                    CacheOp::Delete { key } => {
                        let removed = cache.delete("prop", &key).await;
                        assert_eq!(removed, model.remove(&key).is_some());
                    }
                }
            }
        });

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.errors, 0);
    }

    // Invalidating a tag removes exactly the entries carrying it, and a second
    // invalidation of the same tag removes nothing.
    #[test]
    fn prop_tag_invalidation_is_exact(
        entries in prop::collection::btree_map(
            valid_key_strategy(),
            prop::collection::btree_set(tag_strategy(), 0..3),
            1..20
        ),
        victim in tag_strategy()
    ) {
        let cache = new_core();
        let tagged: BTreeSet<&String> = entries
            .iter()
            .filter(|(_, tags)| tags.contains(&victim))
            .map(|(key, _)| key)
            .collect();

        tokio_test::block_on(async {
            for (key, tags) in &entries {
                let tags: Vec<String> = tags.iter().cloned().collect();
                assert!(cache.set("prop", key, key, TEST_TTL, &tags).await);
            }

            assert_eq!(cache.invalidate_by_tag(&victim).await, tagged.len() as u64);
            assert_eq!(cache.invalidate_by_tag(&victim).await, 0);

            for key in entries.keys() {
                let present = cache.exists("prop", key).await;
                assert_eq!(present, !tagged.contains(key), "key {key}");
            }
        });
    }

    // Every derived key segment is bounded, whatever the raw key looks like.
    #[test]
    fn prop_derived_keys_are_bounded(raw in ".{0,600}", max_len in 16usize..256) {
        let derived = derive_key("ns", &raw, max_len);
        prop_assert!(derived.len() <= max_len.max(66), "derived {} bytes", derived.len());
        prop_assert!(!derived.contains(['*', '?', '[', ']', ' ']));
        prop_assert_eq!(&derived, &derive_key("ns", &raw, max_len));
    }

    // Sanitizing is idempotent.
    #[test]
    fn prop_sanitize_idempotent(raw in ".{0,64}") {
        let once = sanitize(&raw);
        prop_assert_eq!(sanitize(&once), once);
    }
}

// Pattern scans walk many cursor pages; keep the case count low.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_pattern_invalidation_matches_prefix(
        users in prop::collection::btree_set("[a-z0-9]{1,12}", 0..60),
        others in prop::collection::btree_set("[a-z0-9]{1,12}", 0..60)
    ) {
        let cache = new_core();
        tokio_test::block_on(async {
            for id in &users {
                cache.set("api", &format!("user:{id}"), &1, TEST_TTL, &[]).await;
            }
            for id in &others {
                cache.set("api", &format!("org:{id}"), &1, TEST_TTL, &[]).await;
            }

            assert_eq!(cache.invalidate_by_pattern("api:user:*").await, users.len() as u64);
            for id in &others {
                assert!(cache.exists("api", &format!("org:{id}")).await);
            }
        });
    }
}
