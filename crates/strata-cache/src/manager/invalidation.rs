//! Smart invalidation on confirmed writes
//!
//! A confirmed stock write invalidates, in order: the primary entity key
//! (with its relation fan-out), the collection keys that might contain the
//! entity, the movement-history keys scoped to the entity and to the
//! change's kind, a debounced aggregate invalidation, and finally any
//! cross-entity keys discovered from the entity's own cached foreign
//! references. The aggregate step is trailing-edge debounced: triggers
//! arriving within the window collapse into a single downstream
//! invalidation, and a new trigger restarts the window.

use super::InventoryCacheManager;
use crate::domain::{self, keys, InventoryItem, StockMovement};
use crate::error::Result;
use crate::key::CacheKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Debounce scope for inventory aggregate/analytics invalidation
const AGGREGATE_SCOPE: &str = "inventory:aggregates";

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Named, owned debounce timers with an armed -> fired-or-canceled
/// lifecycle. Re-arming a scope aborts the previous timer and reschedules
/// instead of stacking.
pub(crate) struct Debouncer {
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    generation: Mutex<u64>,
}

impl Debouncer {
    pub(crate) fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: Mutex::new(0),
        }
    }

    /// Arm (or re-arm) the scope: after `window` elapses undisturbed,
    /// `action` runs exactly once
    pub(crate) fn arm<F>(&self, scope: &str, window: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };

        let task_timers = Arc::clone(&self.timers);
        let task_scope = scope.to_string();

        // Hold the map lock across the spawn so the task cannot wake and
        // check for its generation before the insert lands.
        let mut timers = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;

            // Disarm before firing; a newer generation means this timer was
            // superseded between wake-up and lock acquisition.
            let fire = {
                let mut timers = task_timers.lock();
                match timers.get(&task_scope) {
                    Some(armed) if armed.generation == generation => {
                        timers.remove(&task_scope);
                        true
                    }
                    _ => false,
                }
            };
            if fire {
                action();
            }
        });

        if let Some(previous) = timers.insert(
            scope.to_string(),
            ArmedTimer { generation, handle },
        ) {
            previous.handle.abort();
        }
    }

    /// Cancel an armed scope with no side effects; returns whether a timer
    /// was armed
    pub(crate) fn cancel(&self, scope: &str) -> bool {
        let mut timers = self.timers.lock();
        match timers.remove(scope) {
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether the scope currently has an armed timer
    pub(crate) fn is_armed(&self, scope: &str) -> bool {
        self.timers.lock().contains_key(scope)
    }

    /// Cancel every armed timer (manager teardown)
    pub(crate) fn cancel_all(&self) {
        let mut timers = self.timers.lock();
        for (_, armed) in timers.drain() {
            armed.handle.abort();
        }
    }
}

/// Outcome of the cross-entity step of a stock-update invalidation
///
/// The original design silently no-oped when the referencing entity was
/// not cached; here the skip is an explicit, observable outcome reported
/// through the best-effort channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossEntityOutcome {
    /// Foreign references were read from the cached snapshot and their
    /// keys invalidated
    Applied {
        /// Cross-entity keys that were invalidated
        keys: Vec<CacheKey>,
    },
    /// No cached snapshot was available to read references from; the step
    /// was skipped and counted as a best-effort failure
    NoCachedReference,
}

/// Summary of one smart-invalidation pass
#[derive(Debug, Clone)]
pub struct StockUpdateReport {
    /// Entries removed across all non-debounced steps
    pub entries_removed: usize,
    /// What happened to the cross-entity step
    pub cross_entity: CrossEntityOutcome,
}

impl InventoryCacheManager {
    /// Coordinate cache invalidation for a confirmed stock write
    pub async fn coordinate_stock_update(
        &self,
        movement: &StockMovement,
    ) -> Result<StockUpdateReport> {
        let item_key = keys::item(movement.item_id);

        // The primary entry is about to be invalidated; read the snapshot
        // first so the cross-entity step can still see its references.
        let snapshot: Option<InventoryItem> = match self.layers().get(&item_key) {
            Some(value) => serde_json::from_value(value).ok(),
            None => None,
        };

        let started = Instant::now();
        let mut removed = 0;

        // (1) Primary key plus rule- and relation-derived keys. The fan-out
        // is folded into this pass's single monitor record below.
        removed += self.coordinator().fan_out(&item_key);

        // (2) Collections that might contain the item.
        for key in keys::collections() {
            removed += usize::from(self.layers().invalidate(&key));
        }

        // (3) History scoped to the entity and to the change's kind.
        removed += usize::from(self.layers().invalidate(&keys::movements(movement.item_id)));
        removed += usize::from(
            self.layers()
                .invalidate(&keys::movements_by_kind(movement.kind)),
        );

        // (4) Debounced aggregate invalidation.
        self.schedule_aggregate_invalidation();

        // (5) Cross-entity keys from the snapshot's foreign references.
        let cross_entity = match snapshot {
            Some(item) => {
                let mut hit = Vec::new();
                if let Some(order_id) = item.order_id {
                    let key = keys::order(order_id);
                    removed += usize::from(self.layers().invalidate(&key));
                    hit.push(key);
                }
                if let Some(product_id) = item.product_id {
                    let key = keys::product(product_id);
                    removed += usize::from(self.layers().invalidate(&key));
                    hit.push(key);
                }
                CrossEntityOutcome::Applied { keys: hit }
            }
            None => {
                debug!(item_id = %movement.item_id,
                       "no cached snapshot; skipping cross-entity invalidation");
                self.monitor().record_best_effort_failure();
                CrossEntityOutcome::NoCachedReference
            }
        };

        self.monitor()
            .record_invalidation(started.elapsed(), removed as u64);

        Ok(StockUpdateReport {
            entries_removed: removed,
            cross_entity,
        })
    }

    /// Arm (or restart) the trailing-edge debounced invalidation of the
    /// aggregate/analytics keys
    pub fn schedule_aggregate_invalidation(&self) {
        let layers = self.layers_arc();
        let monitor = self.monitor_arc();
        let window = self.config().debounce_window;

        self.debouncer().arm(AGGREGATE_SCOPE, window, move || {
            let started = Instant::now();
            let mut removed = u64::from(layers.invalidate(&keys::aggregates()));
            removed += layers.invalidate_by_tags([domain::tags::AGGREGATES]) as u64;
            monitor.record_invalidation(started.elapsed(), removed);
            debug!(removed, "debounced aggregate invalidation fired");
        });
    }

    /// Cancel a pending aggregate invalidation with no side effects
    pub fn cancel_aggregate_invalidation(&self) -> bool {
        self.debouncer().cancel(AGGREGATE_SCOPE)
    }

    /// Whether an aggregate invalidation is currently scheduled
    pub fn aggregate_invalidation_armed(&self) -> bool {
        self.debouncer().is_armed(AGGREGATE_SCOPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MovementKind;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn movement(item_id: Uuid) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            item_id,
            kind: MovementKind::Outbound,
            quantity: 5,
            created_at: Utc::now(),
        }
    }

    fn item_with_refs(order: Option<Uuid>, product: Option<Uuid>) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            sku: "SKU-9".to_string(),
            current_quantity: 10,
            reserved_quantity: 2,
            available_quantity: 8,
            low_stock_threshold: 3,
            visible: true,
            active: true,
            order_id: order,
            product_id: product,
            updated_at: Utc::now(),
        }
    }

    async fn settle() {
        // Let spawned timer tasks observe the advanced clock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_triggers() {
        let manager = InventoryCacheManager::with_defaults();
        manager
            .set(keys::aggregates(), json!({"total": 1}), None, HashSet::new())
            .unwrap();

        // 5 triggers within 200ms against a 1s window.
        for _ in 0..5 {
            manager.schedule_aggregate_invalidation();
            tokio::time::advance(Duration::from_millis(40)).await;
        }
        assert!(manager.aggregate_invalidation_armed());

        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        assert!(!manager.aggregate_invalidation_armed());
        assert_eq!(manager.metrics().invalidations, 1);
        assert!(manager.layers().get(&keys::aggregates()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_restarts_window() {
        let manager = InventoryCacheManager::with_defaults();
        manager
            .set(keys::aggregates(), json!(1), None, HashSet::new())
            .unwrap();

        manager.schedule_aggregate_invalidation();
        settle().await;
        tokio::time::advance(Duration::from_millis(900)).await;
        settle().await;
        // Re-arm just before expiry: nothing may have fired yet.
        manager.schedule_aggregate_invalidation();
        settle().await;
        tokio::time::advance(Duration::from_millis(900)).await;
        settle().await;
        assert_eq!(manager.metrics().invalidations, 0);
        assert!(manager.layers().get(&keys::aggregates()).is_some());

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(manager.metrics().invalidations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_has_no_side_effects() {
        let manager = InventoryCacheManager::with_defaults();
        manager
            .set(keys::aggregates(), json!(1), None, HashSet::new())
            .unwrap();

        manager.schedule_aggregate_invalidation();
        assert!(manager.cancel_aggregate_invalidation());
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(manager.metrics().invalidations, 0);
        assert!(manager.layers().get(&keys::aggregates()).is_some());
        // A second cancel finds nothing armed.
        assert!(!manager.cancel_aggregate_invalidation());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_window_timer_still_fires() {
        let config = crate::manager::ManagerConfig {
            debounce_window: Duration::ZERO,
            ..Default::default()
        };
        let manager = InventoryCacheManager::new(config);
        manager
            .set(keys::aggregates(), json!(1), None, HashSet::new())
            .unwrap();

        // An immediate deadline can wake the task before arm() returns; it
        // must still observe its own generation and fire.
        manager.schedule_aggregate_invalidation();
        for _ in 0..200 {
            if !manager.aggregate_invalidation_armed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(!manager.aggregate_invalidation_armed());
        assert_eq!(manager.metrics().invalidations, 1);
        assert!(manager.layers().get(&keys::aggregates()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_update_invalidates_in_order() {
        let manager = InventoryCacheManager::with_defaults();
        let item = item_with_refs(None, None);
        manager.set_item(&item).unwrap();
        manager
            .set(keys::items_all(), json!([]), None, HashSet::new())
            .unwrap();
        manager
            .set(keys::movements(item.id), json!([]), None, HashSet::new())
            .unwrap();

        let mv = movement(item.id);
        let report = manager.coordinate_stock_update(&mv).await.unwrap();

        assert!(manager.layers().get(&keys::item(item.id)).is_none());
        assert!(manager.layers().get(&keys::items_all()).is_none());
        assert!(manager.layers().get(&keys::movements(item.id)).is_none());
        assert!(report.entries_removed >= 3);
        assert!(manager.aggregate_invalidation_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_update_records_one_invalidation_pass() {
        let manager = InventoryCacheManager::with_defaults();
        let item = item_with_refs(None, None);
        manager.set_item(&item).unwrap();
        manager
            .set(keys::items_all(), json!([]), None, HashSet::new())
            .unwrap();

        let report = manager
            .coordinate_stock_update(&movement(item.id))
            .await
            .unwrap();

        // One logical smart invalidation is exactly one recorded pass, and
        // the counted removals match the report.
        let metrics = manager.metrics();
        assert_eq!(metrics.invalidations, 1);
        assert_eq!(metrics.items_invalidated, report.entries_removed as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_entity_refs_invalidated_from_snapshot() {
        let manager = InventoryCacheManager::with_defaults();
        let order_id = Uuid::new_v4();
        let item = item_with_refs(Some(order_id), None);
        manager.set_item(&item).unwrap();
        manager
            .set(keys::order(order_id), json!({"status": "open"}), None, HashSet::new())
            .unwrap();

        let report = manager
            .coordinate_stock_update(&movement(item.id))
            .await
            .unwrap();

        assert_eq!(
            report.cross_entity,
            CrossEntityOutcome::Applied {
                keys: vec![keys::order(order_id)]
            }
        );
        assert!(manager.layers().get(&keys::order(order_id)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_snapshot_reports_skip() {
        let manager = InventoryCacheManager::with_defaults();
        let report = manager
            .coordinate_stock_update(&movement(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(report.cross_entity, CrossEntityOutcome::NoCachedReference);
        assert_eq!(manager.metrics().best_effort_failures, 1);
    }
}
