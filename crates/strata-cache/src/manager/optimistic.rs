//! Optimistic updates with full rollback
//!
//! An optimistic update applies a derived value to the primary key and to
//! every cached list containing the entity before the remote mutation
//! settles. The exact pre-update snapshots (primary value and full prior
//! list values) are retained under a generated operation id until the
//! mutation confirms or fails. Failure restores the snapshots verbatim:
//! the rollback is always full, never partial.

use super::InventoryCacheManager;
use crate::domain::{self, keys, InventoryItem, StockPatch};
use crate::error::{Error, Result};
use crate::key::CacheKey;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Instant;
use uuid::Uuid;

/// Identifier of a pending optimistic operation
pub type OperationId = Uuid;

struct PendingPatch {
    item_key: CacheKey,
    /// Exact primary value before the patch
    previous_item: serde_json::Value,
    /// Exact full value and tag set of every list entry that was patched
    previous_lists: Vec<(CacheKey, serde_json::Value, HashSet<String>)>,
}

/// Pending optimistic patch records, keyed by operation id
pub(crate) struct PendingPatches {
    inner: Mutex<HashMap<OperationId, PendingPatch>>,
}

impl PendingPatches {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, op: OperationId, patch: PendingPatch) {
        self.inner.lock().insert(op, patch);
    }

    fn take(&self, op: OperationId) -> Option<PendingPatch> {
        self.inner.lock().remove(&op)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl InventoryCacheManager {
    /// Apply a patch optimistically and retain the pre-update snapshot
    ///
    /// Requires a cached snapshot of the item: without one there is nothing
    /// to derive from and the caller must wait for remote confirmation
    /// (`Error::NotCached`). The derived item recomputes dependent fields
    /// (available quantity) and is written to the primary key and patched
    /// into every cached list containing the id.
    pub fn begin_optimistic(&self, item_id: Uuid, patch: &StockPatch) -> Result<OperationId> {
        let item_key = keys::item(item_id);
        let previous_item = self
            .layers()
            .get(&item_key)
            .ok_or_else(|| Error::not_cached(format!("inventory item {item_id}")))?;

        let mut item: InventoryItem = serde_json::from_value(previous_item.clone())?;
        patch.apply_to(&mut item);
        let derived = serde_json::to_value(&item)?;

        let started = Instant::now();
        let previous_lists = self.patch_cached_lists(item_id, &derived)?;
        self.overwrite(item_key.clone(), derived, domain::tags::item_tags())?;

        let op = Uuid::new_v4();
        self.pending().insert(
            op,
            PendingPatch {
                item_key,
                previous_item,
                previous_lists,
            },
        );
        self.monitor().record_optimistic_update(started.elapsed());
        Ok(op)
    }

    /// The remote mutation succeeded: discard the retained snapshot
    pub fn confirm(&self, op: OperationId) -> Result<()> {
        self.pending()
            .take(op)
            .map(|_| ())
            .ok_or_else(|| Error::invalid_patch(format!("unknown operation {op}")))
    }

    /// The remote mutation failed: restore the exact pre-update snapshots
    pub fn roll_back(&self, op: OperationId) -> Result<()> {
        let patch = self
            .pending()
            .take(op)
            .ok_or_else(|| Error::invalid_patch(format!("unknown operation {op}")))?;

        self.overwrite(
            patch.item_key,
            patch.previous_item,
            domain::tags::item_tags(),
        )?;
        for (key, previous, tags) in patch.previous_lists {
            self.overwrite(key, previous, tags)?;
        }
        self.monitor().record_rollback();
        Ok(())
    }

    /// Drive a full optimistic mutation against a remote operation
    ///
    /// The patch is applied immediately when a snapshot is cached; when it
    /// is not, no optimistic step is taken and the caller simply waits for
    /// confirmation. On success the confirmed entity replaces the
    /// optimistic value; on failure the cache is rolled back before the
    /// error propagates.
    pub async fn optimistic_update<Fut>(
        &self,
        item_id: Uuid,
        patch: StockPatch,
        mutate: Fut,
    ) -> Result<InventoryItem>
    where
        Fut: Future<Output = Result<InventoryItem>>,
    {
        let op = match self.begin_optimistic(item_id, &patch) {
            Ok(op) => Some(op),
            Err(Error::NotCached(_)) => None,
            Err(err) => return Err(err),
        };

        match mutate.await {
            Ok(confirmed) => {
                if let Some(op) = op {
                    self.confirm(op)?;
                }
                let value = serde_json::to_value(&confirmed)?;
                self.patch_cached_lists(confirmed.id, &value)?;
                self.overwrite(keys::item(confirmed.id), value, domain::tags::item_tags())?;
                Ok(confirmed)
            }
            Err(err) => {
                if let Some(op) = op {
                    self.roll_back(op)?;
                }
                Err(err)
            }
        }
    }
}
