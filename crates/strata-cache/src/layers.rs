//! Multi-layer cache composition
//!
//! Composes several `CacheStore`s ordered fastest/smallest to
//! slowest/largest, with read-through promotion: a hit in a slower layer is
//! copied into every faster layer (using each faster layer's own default
//! TTL) before being returned. Writes go to exactly one layer; a logical
//! invalidation removes the key from every layer so no stale copy can
//! survive in a tier the write skipped.

use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::store::{CacheStore, StoreConfig, StoreStats};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Ordered composition of cache layers, fastest first
pub struct MultiLayerCache {
    layers: Vec<CacheStore>,
}

impl MultiLayerCache {
    /// Build from layer configurations, fastest first
    pub fn new(configs: Vec<StoreConfig>) -> Self {
        Self {
            layers: configs.into_iter().map(CacheStore::new).collect(),
        }
    }

    /// Conventional three-tier setup: a small short-TTL LRU tier, a medium
    /// tier, and a large long-TTL tier
    pub fn with_default_layers() -> Self {
        use crate::store::EvictionPolicy;
        Self::new(vec![
            StoreConfig {
                name: "fast".to_string(),
                max_entries: 256,
                default_ttl: Some(Duration::from_secs(60)),
                policy: EvictionPolicy::Lru,
            },
            StoreConfig {
                name: "medium".to_string(),
                max_entries: 1024,
                default_ttl: Some(Duration::from_secs(300)),
                policy: EvictionPolicy::Lru,
            },
            StoreConfig {
                name: "long".to_string(),
                max_entries: 4096,
                default_ttl: Some(Duration::from_secs(3600)),
                policy: EvictionPolicy::Lfu,
            },
        ])
    }

    /// Layer names in probe order
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Probe layers fastest-to-slowest; on a hit at layer `i`, promote the
    /// value into layers `0..i` under their own default TTLs, carrying the
    /// entry's tags so promoted copies stay reachable by tag invalidation
    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        self.get_entry(key).map(|(value, _)| value)
    }

    /// `get` that also yields the entry's tag set, for callers that rewrite
    /// an entry and must preserve its original tags
    pub(crate) fn get_entry(
        &self,
        key: &CacheKey,
    ) -> Option<(serde_json::Value, HashSet<String>)> {
        for (i, layer) in self.layers.iter().enumerate() {
            if let Some((value, tags)) = layer.get_entry(key) {
                if i > 0 {
                    debug!(key = %key, layer = layer.name(), "promoting cache hit");
                    for faster in &self.layers[..i] {
                        faster.set(key.clone(), value.clone(), None, tags.clone());
                    }
                }
                return Some((value, tags));
            }
        }
        None
    }

    /// Write-through to exactly one layer
    ///
    /// `layer = None` targets the fastest layer. Naming a layer that does
    /// not exist is a caller bug and surfaces as `Error::UnknownLayer`.
    pub fn set(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        layer: Option<&str>,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) -> Result<()> {
        let target = match layer {
            Some(name) => self
                .layers
                .iter()
                .find(|l| l.name() == name)
                .ok_or_else(|| Error::UnknownLayer(name.to_string()))?,
            None => self
                .layers
                .first()
                .ok_or_else(|| Error::internal("multi-layer cache has no layers"))?,
        };
        target.set(key, value, ttl, tags);
        Ok(())
    }

    /// Remove the key from every layer; returns whether any copy existed
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut removed = false;
        for layer in &self.layers {
            removed |= layer.delete(key);
        }
        removed
    }

    /// Remove every entry carrying any of the tags from every layer;
    /// returns the total number of entries removed
    pub fn invalidate_by_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str> + Clone,
    ) -> usize {
        let mut removed = 0;
        for layer in &self.layers {
            removed += layer.invalidate_by_tags(tags.clone());
        }
        removed
    }

    /// Remove every key matching the predicate from every layer
    pub fn invalidate_matching(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut removed = 0;
        for layer in &self.layers {
            for key in layer.keys() {
                if predicate(&key) && layer.delete(&key) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Whether any layer holds a live copy of the key
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.layers.iter().any(|l| l.contains(key))
    }

    /// Distinct live keys across all layers
    pub fn keys(&self) -> HashSet<CacheKey> {
        let mut keys = HashSet::new();
        for layer in &self.layers {
            keys.extend(layer.keys());
        }
        keys
    }

    /// Drop everything from every layer
    pub fn clear(&self) {
        for layer in &self.layers {
            layer.clear();
        }
    }

    /// Per-layer counter snapshots, fastest first
    pub fn stats(&self) -> Vec<StoreStats> {
        self.layers.iter().map(|l| l.stats()).collect()
    }

    /// Direct access to a layer by name (tests, diagnostics)
    pub fn layer(&self, name: &str) -> Option<&CacheStore> {
        self.layers.iter().find(|l| l.name() == name)
    }
}
