//! Bounded key/value store with TTL and pluggable eviction
//!
//! One `CacheStore` is one cache layer: a bounded table of opaque JSON
//! values with per-entry TTL, a tag index for bulk invalidation, and one of
//! three eviction policies. All mutations run inside a single
//! `parking_lot::RwLock` critical section, so the entry table and the tag
//! index can never be observed out of sync.

use crate::key::CacheKey;
use crate::tags::TagIndex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Victim-selection policy applied when a store is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the least-recently-accessed entry
    Lru,
    /// Evict the entry with the lowest access count; ties broken by
    /// insertion order
    Lfu,
    /// Evict the oldest-inserted entry
    Fifo,
}

/// Configuration for a single cache store / layer
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Layer name, unique within a `MultiLayerCache`
    pub name: String,
    /// Maximum number of entries before eviction kicks in
    pub max_entries: usize,
    /// Default TTL for entries written without an explicit TTL
    /// (`None` = never expires)
    pub default_ttl: Option<Duration>,
    /// Eviction policy
    pub policy: EvictionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_entries: 1000,
            default_ttl: Some(Duration::from_secs(300)), // 5 minutes
            policy: EvictionPolicy::Lru,
        }
    }
}

/// A cached value with expiry and access-tracking metadata
///
/// Owned exclusively by the store; callers receive clones.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
    ttl: Option<Duration>,
    tags: HashSet<String>,
    /// Monotonic sequence at insertion time (FIFO order, LFU tie-break)
    insert_seq: u64,
    /// Monotonic sequence at last access (LRU order)
    last_access_seq: u64,
    /// Number of accesses since insertion (LFU order)
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.created_at) > ttl,
            None => false,
        }
    }
}

/// Counters for a single store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Layer name
    pub name: String,
    /// Current number of live entries
    pub len: usize,
    /// Lookups that returned a value
    pub hits: u64,
    /// Lookups that returned nothing (including lazy TTL purges)
    pub misses: u64,
    /// Entries removed to make room for an insert
    pub evictions: u64,
    /// Entries purged because their TTL elapsed
    pub expirations: u64,
    /// Entries written (inserts and overwrites)
    pub inserts: u64,
}

impl StoreStats {
    /// Hit rate in `[0.0, 1.0]`; `0.0` when no lookups were recorded
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    inserts: u64,
}

struct StoreInner {
    entries: HashMap<CacheKey, CacheEntry>,
    tag_index: TagIndex,
    /// Monotonic sequence driving LRU/LFU/FIFO ordering
    seq: u64,
    counters: Counters,
}

impl StoreInner {
    /// Remove an entry and its tag-index registrations in one step
    fn remove_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.tag_index.remove(key, &entry.tags);
        Some(entry)
    }

    /// Pick and remove one victim per policy. Linear scan; stores are
    /// bounded and eviction is off the read path.
    fn evict_one(&mut self, policy: EvictionPolicy) {
        let victim = match policy {
            EvictionPolicy::Lru => self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_seq)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.insert_seq))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Fifo => self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.insert_seq)
                .map(|(k, _)| k.clone()),
        };

        if let Some(key) = victim {
            self.remove_entry(&key);
            self.counters.evictions += 1;
        }
    }
}

/// One bounded cache layer
pub struct CacheStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
}

impl CacheStore {
    /// Create a store from its configuration
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                tag_index: TagIndex::new(),
                seq: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Default TTL for this store
    pub fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl
    }

    /// Look up a key, purging it if its TTL has elapsed
    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        self.get_entry(key).map(|(value, _)| value)
    }

    /// Lookup that also returns the entry's tags, so layer promotion can
    /// carry them into the faster copy
    pub(crate) fn get_entry(
        &self,
        key: &CacheKey,
    ) -> Option<(serde_json::Value, HashSet<String>)> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.counters.misses += 1;
                return None;
            }
        };

        if expired {
            inner.remove_entry(key);
            inner.counters.expirations += 1;
            inner.counters.misses += 1;
            return None;
        }

        inner.seq += 1;
        let seq = inner.seq;
        let entry = inner.entries.get_mut(key)?;
        entry.last_access_seq = seq;
        entry.access_count += 1;
        let result = (entry.value.clone(), entry.tags.clone());
        inner.counters.hits += 1;
        Some(result)
    }

    /// Write a key
    ///
    /// `ttl = None` falls back to the store default. A new key arriving at
    /// capacity evicts exactly one victim first, so the store never exceeds
    /// `max_entries`. The tag index is updated in the same critical section.
    pub fn set(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) {
        let effective_ttl = ttl.or(self.config.default_ttl);
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.seq += 1;
        let seq = inner.seq;

        if let Some(entry) = inner.entries.get_mut(&key) {
            // Overwrite: retag, restart TTL, keep FIFO age.
            inner.tag_index.remove(&key, &entry.tags);
            inner.tag_index.insert(&key, &tags);
            entry.value = value;
            entry.created_at = Instant::now();
            entry.ttl = effective_ttl;
            entry.tags = tags;
            entry.last_access_seq = seq;
            entry.access_count += 1;
            inner.counters.inserts += 1;
            return;
        }

        if inner.entries.len() >= self.config.max_entries {
            inner.evict_one(self.config.policy);
        }

        inner.tag_index.insert(&key, &tags);
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl: effective_ttl,
                tags,
                insert_seq: seq,
                last_access_seq: seq,
                access_count: 0,
            },
        );
        inner.counters.inserts += 1;
    }

    /// Remove a key; returns whether it was present
    pub fn delete(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.write();
        inner.remove_entry(key).is_some()
    }

    /// Remove every entry carrying any of the given tags; returns the
    /// number removed
    pub fn invalidate_by_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let mut inner = self.inner.write();
        let keys = inner.tag_index.keys_for_tags(tags);
        let mut removed = 0;
        for key in keys {
            if inner.remove_entry(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Keys of all live (non-expired) entries
    pub fn keys(&self) -> Vec<CacheKey> {
        let inner = self.inner.read();
        let now = Instant::now();
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether a key is present and not expired
    pub fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.read();
        inner
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(Instant::now()))
    }

    /// Number of live entries (expired-but-unpurged entries excluded)
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        let now = Instant::now();
        inner.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries and tag associations
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.tag_index.clear();
    }

    /// Snapshot of this store's counters
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let now = Instant::now();
        StoreStats {
            name: self.config.name.clone(),
            len: inner.entries.values().filter(|e| !e.is_expired(now)).count(),
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            evictions: inner.counters.evictions,
            expirations: inner.counters.expirations,
            inserts: inner.counters.inserts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    fn key(name: &str) -> CacheKey {
        CacheKey::domain("test").push(name)
    }

    fn store(max: usize, policy: EvictionPolicy) -> CacheStore {
        CacheStore::new(StoreConfig {
            name: "test".to_string(),
            max_entries: max,
            default_ttl: Some(Duration::from_secs(60)),
            policy,
        })
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = store(10, EvictionPolicy::Lru);
        store.set(key("a"), json!({"v": 1}), None, HashSet::new());
        assert_eq!(store.get(&key("a")), Some(json!({"v": 1})));
        assert_eq!(store.get(&key("b")), None);
    }

    #[test]
    fn test_ttl_expiry_purges_entry() {
        let store = store(10, EvictionPolicy::Lru);
        store.set(
            key("a"),
            json!(1),
            Some(Duration::from_millis(50)),
            HashSet::new(),
        );
        assert_eq!(store.get(&key("a")), Some(json!(1)));
        assert_eq!(store.len(), 1);

        sleep(Duration::from_millis(80));
        assert_eq!(store.get(&key("a")), None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_stats_len_agrees_with_len_after_ttl_lapse() {
        let store = store(10, EvictionPolicy::Lru);
        store.set(
            key("a"),
            json!(1),
            Some(Duration::from_millis(30)),
            HashSet::new(),
        );
        assert_eq!(store.stats().len, 1);

        // No lookup in between, so the entry is expired but unpurged.
        sleep(Duration::from_millis(60));
        assert_eq!(store.stats().len, 0);
        assert_eq!(store.len(), store.stats().len);
    }

    #[test]
    fn test_none_ttl_never_expires() {
        let store = CacheStore::new(StoreConfig {
            name: "test".to_string(),
            max_entries: 10,
            default_ttl: None,
            policy: EvictionPolicy::Lru,
        });
        store.set(key("a"), json!(1), None, HashSet::new());
        sleep(Duration::from_millis(30));
        assert_eq!(store.get(&key("a")), Some(json!(1)));
    }

    #[test]
    fn test_lru_eviction() {
        let store = store(2, EvictionPolicy::Lru);
        store.set(key("a"), json!("a"), None, HashSet::new());
        store.set(key("b"), json!("b"), None, HashSet::new());

        // Touch A so B becomes the LRU victim.
        let _ = store.get(&key("a"));

        store.set(key("c"), json!("c"), None, HashSet::new());
        assert!(store.contains(&key("a")));
        assert!(!store.contains(&key("b")));
        assert!(store.contains(&key("c")));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_lfu_eviction_ties_broken_by_insertion() {
        let store = store(2, EvictionPolicy::Lfu);
        store.set(key("a"), json!("a"), None, HashSet::new());
        store.set(key("b"), json!("b"), None, HashSet::new());

        // Equal access counts: the older insertion (A) is the victim.
        store.set(key("c"), json!("c"), None, HashSet::new());
        assert!(!store.contains(&key("a")));
        assert!(store.contains(&key("b")));

        // B now has accesses; C (count 0) is the victim.
        let _ = store.get(&key("b"));
        let _ = store.get(&key("b"));
        store.set(key("d"), json!("d"), None, HashSet::new());
        assert!(store.contains(&key("b")));
        assert!(!store.contains(&key("c")));
    }

    #[test]
    fn test_fifo_eviction_ignores_access_order() {
        let store = store(2, EvictionPolicy::Fifo);
        store.set(key("a"), json!("a"), None, HashSet::new());
        store.set(key("b"), json!("b"), None, HashSet::new());

        // Accessing A does not save it under FIFO.
        let _ = store.get(&key("a"));

        store.set(key("c"), json!("c"), None, HashSet::new());
        assert!(!store.contains(&key("a")));
        assert!(store.contains(&key("b")));
        assert!(store.contains(&key("c")));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let store = store(2, EvictionPolicy::Lru);
        store.set(key("a"), json!(1), None, HashSet::new());
        store.set(key("b"), json!(2), None, HashSet::new());
        store.set(key("a"), json!(3), None, HashSet::new());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&key("a")), Some(json!(3)));
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_tag_invalidation() {
        let store = store(10, EvictionPolicy::Lru);
        let x: HashSet<String> = ["x".to_string()].into();
        let xy: HashSet<String> = ["x".to_string(), "y".to_string()].into();
        let y: HashSet<String> = ["y".to_string()].into();

        store.set(key("a"), json!("a"), None, x);
        store.set(key("b"), json!("b"), None, xy);
        store.set(key("c"), json!("c"), None, y);

        let removed = store.invalidate_by_tags(["x"]);
        assert_eq!(removed, 2);
        assert!(!store.contains(&key("a")));
        assert!(!store.contains(&key("b")));
        assert!(store.contains(&key("c")));
    }

    #[test]
    fn test_overwrite_retags_consistently() {
        let store = store(10, EvictionPolicy::Lru);
        let old: HashSet<String> = ["old".to_string()].into();
        let new: HashSet<String> = ["new".to_string()].into();

        store.set(key("a"), json!(1), None, old);
        store.set(key("a"), json!(2), None, new);

        assert_eq!(store.invalidate_by_tags(["old"]), 0);
        assert_eq!(store.invalidate_by_tags(["new"]), 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let store = store(3, EvictionPolicy::Fifo);
        for i in 0..20i64 {
            store.set(
                CacheKey::domain("test").push(i),
                json!(i),
                None,
                HashSet::new(),
            );
            assert!(store.len() <= 3);
        }
    }

    #[test]
    fn test_clear() {
        let store = store(10, EvictionPolicy::Lru);
        let x: HashSet<String> = ["x".to_string()].into();
        store.set(key("a"), json!(1), None, x);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.invalidate_by_tags(["x"]), 0);
    }
}
