//! Inventory cache manager
//!
//! Orchestrates the layered stores, tag index, relation graph, and monitor
//! into the domain-facing coordination protocols: smart invalidation on
//! confirmed writes, optimistic updates with rollback, real-time patch
//! application, batched invalidation for bulk operations, and predictive
//! warming.
//!
//! A manager is an explicitly constructed, owned instance. All cache state
//! lives inside it; two managers share nothing, so tests and tenants get
//! full isolation by constructing their own.

mod batch;
mod invalidation;
mod optimistic;
mod realtime;
mod warming;

pub use batch::BatchInvalidationReport;
pub use invalidation::{CrossEntityOutcome, StockUpdateReport};
pub use optimistic::OperationId;

use crate::domain::{self, keys, InventoryItem};
use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::layers::MultiLayerCache;
use crate::monitor::{CacheMetrics, PerformanceAnalysis, PerformanceMonitor};
use crate::relations::{CacheCoordinator, RelationRule};
use crate::store::{EvictionPolicy, StoreConfig, StoreStats};
use invalidation::Debouncer;
use optimistic::PendingPatches;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Configuration for an `InventoryCacheManager`
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Layer configurations, fastest first
    pub layers: Vec<StoreConfig>,
    /// Trailing-edge debounce window for aggregate invalidation
    pub debounce_window: Duration,
    /// TTL applied to entries written by predictive warming
    pub warm_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            layers: vec![
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
            ],
            debounce_window: Duration::from_secs(1),
            warm_ttl: Duration::from_secs(2 * 3600), // longer than any layer default
        }
    }
}

/// Domain cache manager for the inventory domain
pub struct InventoryCacheManager {
    config: ManagerConfig,
    layers: Arc<MultiLayerCache>,
    coordinator: CacheCoordinator,
    monitor: Arc<PerformanceMonitor>,
    debouncer: Debouncer,
    pending: PendingPatches,
}

impl InventoryCacheManager {
    /// Create a manager with the given configuration
    pub fn new(config: ManagerConfig) -> Self {
        let layers = Arc::new(MultiLayerCache::new(config.layers.clone()));
        let monitor = Arc::new(PerformanceMonitor::new());
        let coordinator = CacheCoordinator::new(Arc::clone(&layers), Arc::clone(&monitor));

        // Static pattern rule: an item's movement history always tracks the
        // item, independent of any dynamically registered edges.
        coordinator.add_rule(RelationRule::new("item-movements", |key: &CacheKey| {
            use crate::key::Segment;
            match key.segments() {
                [Segment::Str(d), Segment::Str(c), Segment::Id(id)]
                    if d == domain::DOMAIN && c == "items" =>
                {
                    Ok(vec![keys::movements(*id)])
                }
                _ => Ok(Vec::new()),
            }
        }));

        Self {
            config,
            layers,
            coordinator,
            monitor,
            debouncer: Debouncer::new(),
            pending: PendingPatches::new(),
        }
    }

    /// Create a manager with the default three-tier configuration
    pub fn with_defaults() -> Self {
        Self::new(ManagerConfig::default())
    }

    /// Read a raw cached value, recording hit/miss metrics
    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let started = Instant::now();
        match self.layers.get(key) {
            Some(value) => {
                self.monitor.record_hit(started.elapsed());
                Some(value)
            }
            None => {
                self.monitor.record_miss(started.elapsed());
                None
            }
        }
    }

    /// Read and deserialize a cached value
    pub fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read a cached inventory item by id
    pub fn get_item(&self, id: Uuid) -> Result<Option<InventoryItem>> {
        self.get_as(&keys::item(id))
    }

    /// Write a raw value to the fastest layer
    pub fn set(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) -> Result<()> {
        self.layers.set(key, value, None, ttl, tags)
    }

    /// Write a raw value to a named layer
    pub fn set_in_layer(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        layer: &str,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) -> Result<()> {
        self.layers.set(key, value, Some(layer), ttl, tags)
    }

    /// Cache an inventory item under its primary key
    pub fn set_item(&self, item: &InventoryItem) -> Result<()> {
        let value = serde_json::to_value(item)?;
        self.layers
            .set(keys::item(item.id), value, None, None, domain::tags::item_tags())
    }

    /// Invalidate a single key across all layers
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let started = Instant::now();
        let removed = self.layers.invalidate(key);
        self.monitor
            .record_invalidation(started.elapsed(), removed as u64);
        removed
    }

    /// Invalidate every entry carrying any of the tags
    pub fn invalidate_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str> + Clone,
    ) -> usize {
        let started = Instant::now();
        let removed = self.layers.invalidate_by_tags(tags);
        self.monitor
            .record_invalidation(started.elapsed(), removed as u64);
        removed
    }

    /// Invalidate every key matching the predicate
    pub fn invalidate_matching(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let started = Instant::now();
        let removed = self.layers.invalidate_matching(predicate);
        self.monitor
            .record_invalidation(started.elapsed(), removed as u64);
        removed
    }

    /// Register a symmetric relation edge for cross-entity fan-out
    pub fn register_relation(&self, a: CacheKey, b: CacheKey) {
        self.coordinator.register_relation(a, b);
    }

    /// Invalidate a key together with its rule- and relation-derived keys
    pub fn invalidate_related(&self, key: &CacheKey) -> usize {
        self.coordinator.invalidate_related(key)
    }

    /// Counter snapshot
    pub fn metrics(&self) -> CacheMetrics {
        self.monitor.metrics()
    }

    /// Threshold-based health report
    pub fn performance_analysis(&self) -> PerformanceAnalysis {
        self.monitor.analysis()
    }

    /// Per-layer store counters, fastest first
    pub fn layer_stats(&self) -> Vec<StoreStats> {
        self.layers.stats()
    }

    /// Drop every cached entry; relations and pending patches are kept
    pub fn clear(&self) {
        self.layers.clear();
    }

    pub(crate) fn layers(&self) -> &MultiLayerCache {
        &self.layers
    }

    pub(crate) fn layers_arc(&self) -> Arc<MultiLayerCache> {
        Arc::clone(&self.layers)
    }

    pub(crate) fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub(crate) fn monitor_arc(&self) -> Arc<PerformanceMonitor> {
        Arc::clone(&self.monitor)
    }

    pub(crate) fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub(crate) fn pending(&self) -> &PendingPatches {
        &self.pending
    }

    pub(crate) fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }

    /// Name of the slowest configured layer (warming target)
    pub(crate) fn slowest_layer(&self) -> Result<&str> {
        self.config
            .layers
            .last()
            .map(|l| l.name.as_str())
            .ok_or_else(|| Error::internal("manager configured with no layers"))
    }

    /// Overwrite a key everywhere: stale copies in slower layers are
    /// removed, the fresh value lands in the fastest layer
    pub(crate) fn overwrite(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        tags: HashSet<String>,
    ) -> Result<()> {
        self.layers.invalidate(&key);
        self.layers.set(key, value, None, None, tags)
    }

    /// Replace the entity's slot in every cached list containing it,
    /// preserving order, all other entries, and the entry's own tag set
    ///
    /// Returns the exact prior value and tags of each list that was
    /// patched, so the caller can retain them for rollback.
    pub(crate) fn patch_cached_lists(
        &self,
        item_id: Uuid,
        replacement: &serde_json::Value,
    ) -> Result<Vec<(CacheKey, serde_json::Value, HashSet<String>)>> {
        let mut patched = Vec::new();
        for key in keys::collections() {
            let Some((list, tags)) = self.layers.get_entry(&key) else {
                continue;
            };
            let Some(updated) = patch_list_slot(&list, item_id, replacement) else {
                continue;
            };
            self.overwrite(key.clone(), updated, tags.clone())?;
            patched.push((key, list, tags));
        }
        Ok(patched)
    }
}

/// Replace the slot whose `id` field matches, keeping order and length;
/// `None` when the list is not an array or does not contain the id
pub(crate) fn patch_list_slot(
    list: &serde_json::Value,
    item_id: Uuid,
    replacement: &serde_json::Value,
) -> Option<serde_json::Value> {
    let entries = list.as_array()?;
    let id_str = item_id.to_string();
    let slot = entries
        .iter()
        .position(|entry| entry.get("id").and_then(|v| v.as_str()) == Some(id_str.as_str()))?;

    let mut updated = entries.clone();
    updated[slot] = replacement.clone();
    Some(serde_json::Value::Array(updated))
}

/// Tags carried by a well-known collection entry
pub(crate) fn collection_tags_for(key: &CacheKey) -> HashSet<String> {
    if *key == keys::items_low_stock() {
        domain::tags::collection_tags(domain::tags::LOW_STOCK)
    } else if *key == keys::items_visible() {
        domain::tags::collection_tags(domain::tags::VISIBLE)
    } else if *key == keys::items_active() {
        domain::tags::collection_tags(domain::tags::ACTIVE)
    } else {
        domain::tags::collection_tags(domain::tags::LISTS)
    }
}

impl Drop for InventoryCacheManager {
    fn drop(&mut self) {
        // Teardown cancels armed debounce timers with no side effects.
        self.debouncer.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn item(id: Uuid) -> InventoryItem {
        InventoryItem {
            id,
            sku: "SKU-1".to_string(),
            current_quantity: 100,
            reserved_quantity: 0,
            available_quantity: 100,
            low_stock_threshold: 5,
            visible: true,
            active: true,
            order_id: None,
            product_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_managers_are_isolated() {
        let a = InventoryCacheManager::with_defaults();
        let b = InventoryCacheManager::with_defaults();
        let key = CacheKey::domain("test").push("shared");

        a.set(key.clone(), json!(1), None, HashSet::new()).unwrap();
        assert!(a.get(&key).is_some());
        assert!(b.get(&key).is_none());
    }

    #[test]
    fn test_get_records_hits_and_misses() {
        let manager = InventoryCacheManager::with_defaults();
        let key = CacheKey::domain("test").push("a");
        manager.set(key.clone(), json!(1), None, HashSet::new()).unwrap();

        for _ in 0..8 {
            assert!(manager.get(&key).is_some());
        }
        let missing = CacheKey::domain("test").push("missing");
        for _ in 0..2 {
            assert!(manager.get(&missing).is_none());
        }

        let metrics = manager.metrics();
        assert_eq!(metrics.total_operations, 10);
        assert!((metrics.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_item_get_item_roundtrip() {
        let manager = InventoryCacheManager::with_defaults();
        let it = item(Uuid::new_v4());
        manager.set_item(&it).unwrap();

        let cached = manager.get_item(it.id).unwrap();
        assert_eq!(cached, Some(it));
    }

    #[test]
    fn test_item_movement_rule_fans_out() {
        let manager = InventoryCacheManager::with_defaults();
        let it = item(Uuid::new_v4());
        manager.set_item(&it).unwrap();
        manager
            .set(keys::movements(it.id), json!([]), None, HashSet::new())
            .unwrap();

        manager.invalidate_related(&keys::item(it.id));
        assert!(manager.layers().get(&keys::item(it.id)).is_none());
        assert!(manager.layers().get(&keys::movements(it.id)).is_none());
    }

    #[test]
    fn test_overwrite_clears_slower_copies() {
        let manager = InventoryCacheManager::with_defaults();
        let key = CacheKey::domain("test").push("a");
        manager
            .set_in_layer(key.clone(), json!("stale"), "long", None, HashSet::new())
            .unwrap();

        manager
            .overwrite(key.clone(), json!("fresh"), HashSet::new())
            .unwrap();

        assert_eq!(
            manager.layers().layer("long").unwrap().get(&key),
            None,
            "stale copy must not survive in the slow layer"
        );
        assert_eq!(manager.get(&key), Some(json!("fresh")));
    }
}
