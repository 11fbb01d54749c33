//! Real-time update coordination
//!
//! Push notifications deliver fresh authoritative snapshots. The primary
//! key is overwritten (replaced, never merged), every cached list patches
//! only the entity's slot in place, a carried history record is prepended
//! to cached history heads, and the same debounced aggregate invalidation
//! as the write path is scheduled. Application is idempotent and tolerant
//! of duplicate notifications: the last applied snapshot wins.

use super::InventoryCacheManager;
use crate::domain::{self, keys, InventoryItem, StockMovement};
use crate::error::{Error, Result};
use crate::key::CacheKey;
use std::collections::HashSet;
use uuid::Uuid;

fn movement_tags() -> HashSet<String> {
    [
        domain::tags::INVENTORY.to_string(),
        domain::tags::MOVEMENTS.to_string(),
    ]
    .into()
}

impl InventoryCacheManager {
    /// Apply a fresh authoritative snapshot pushed by the change feed
    pub fn apply_realtime_update(
        &self,
        item_id: Uuid,
        snapshot: InventoryItem,
        movement: Option<StockMovement>,
    ) -> Result<()> {
        if snapshot.id != item_id {
            return Err(Error::invalid_patch(format!(
                "realtime snapshot id {} does not match entity id {}",
                snapshot.id, item_id
            )));
        }

        let value = serde_json::to_value(&snapshot)?;

        // Replace the primary entry outright; merging with a stale local
        // value could resurrect fields the server already changed.
        self.patch_cached_lists(item_id, &value)?;
        self.overwrite(keys::item(item_id), value, domain::tags::item_tags())?;

        if let Some(movement) = movement {
            self.prepend_history(&keys::movements(item_id), &movement)?;
            self.prepend_history(&keys::movements_by_kind(movement.kind), &movement)?;
        }

        self.schedule_aggregate_invalidation();
        Ok(())
    }

    /// Prepend a movement to a cached history list head, if one exists
    fn prepend_history(&self, key: &CacheKey, movement: &StockMovement) -> Result<()> {
        let Some(cached) = self.layers().get(key) else {
            return Ok(());
        };
        let Some(entries) = cached.as_array() else {
            return Ok(());
        };

        // Duplicate delivery: the movement is already in the cached head.
        let movement_id = movement.id.to_string();
        if entries
            .iter()
            .any(|e| e.get("id").and_then(|v| v.as_str()) == Some(movement_id.as_str()))
        {
            return Ok(());
        }

        let mut updated = Vec::with_capacity(entries.len() + 1);
        updated.push(serde_json::to_value(movement)?);
        updated.extend(entries.iter().cloned());
        self.overwrite(
            key.clone(),
            serde_json::Value::Array(updated),
            movement_tags(),
        )
    }
}
