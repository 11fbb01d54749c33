//! Inventory domain records and well-known cache keys
//!
//! Records cross the cache boundary as opaque, already-validated JSON; the
//! typed structs here are the fixed schemas the manager serializes at its
//! edges. Validation of remote payloads belongs to the fetch collaborator,
//! not this engine.

use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain segment heading every inventory key
pub const DOMAIN: &str = "inventory";

/// A stock-keeping item as cached locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Entity id
    pub id: Uuid,
    /// Stock-keeping unit code
    pub sku: String,
    /// Units physically on hand
    pub current_quantity: i64,
    /// Units held for open orders
    pub reserved_quantity: i64,
    /// Derived: `current_quantity - reserved_quantity`
    pub available_quantity: i64,
    /// Threshold under which the item counts as low stock
    pub low_stock_threshold: i64,
    /// Whether the item appears in storefront queries
    pub visible: bool,
    /// Whether the item is in the active lifecycle state
    pub active: bool,
    /// Foreign reference to an order this item is attached to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    /// Foreign reference to the owning product, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
    /// Last server-side modification time
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Recompute the derived available quantity
    pub fn recompute_available(&mut self) {
        self.available_quantity = self.current_quantity - self.reserved_quantity;
    }
}

/// Category of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock received
    Inbound,
    /// Stock shipped or consumed
    Outbound,
    /// Manual correction
    Adjustment,
    /// Stock held against an order
    Reservation,
}

impl MovementKind {
    /// Stable name used in movement-history key segments
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Reservation => "reservation",
        }
    }
}

/// One confirmed stock movement; doubles as the change description handed
/// to `coordinate_stock_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    /// Movement record id
    pub id: Uuid,
    /// Item the movement applies to
    pub item_id: Uuid,
    /// Movement category
    pub kind: MovementKind,
    /// Signed unit count
    pub quantity: i64,
    /// When the movement was recorded
    pub created_at: DateTime<Utc>,
}

/// Partial update proposed by an optimistic mutation
///
/// Only the listed fields can be patched locally; everything else waits for
/// the confirmed entity from the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockPatch {
    /// New on-hand quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_quantity: Option<i64>,
    /// New reserved quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_quantity: Option<i64>,
    /// New storefront visibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// New lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl StockPatch {
    /// Apply the patch to an item, recomputing derived fields
    pub fn apply_to(&self, item: &mut InventoryItem) {
        if let Some(qty) = self.current_quantity {
            item.current_quantity = qty;
        }
        if let Some(reserved) = self.reserved_quantity {
            item.reserved_quantity = reserved;
        }
        if let Some(visible) = self.visible {
            item.visible = visible;
        }
        if let Some(active) = self.active {
            item.active = active;
        }
        item.recompute_available();
    }
}

/// Kind of a bulk operation, mapped to the cache-impact categories it
/// touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperationKind {
    /// Quantity change
    StockUpdate,
    /// Storefront visibility toggle
    VisibilityChange,
    /// Price change
    PriceUpdate,
    /// Lifecycle state change
    StatusChange,
}

impl BulkOperationKind {
    /// Impact categories (tags) a bulk operation of this kind invalidates
    pub fn impact_tags(&self) -> &'static [&'static str] {
        match self {
            BulkOperationKind::StockUpdate => {
                &[tags::MOVEMENTS, tags::LOW_STOCK, tags::AGGREGATES]
            }
            BulkOperationKind::VisibilityChange => &[tags::VISIBLE, tags::LISTS],
            BulkOperationKind::PriceUpdate => &[tags::LISTS],
            BulkOperationKind::StatusChange => &[tags::ACTIVE, tags::LISTS],
        }
    }
}

/// One element of a bulk mutation handed to `batch_invalidate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    /// Entity the operation targets
    pub entity_id: Uuid,
    /// What the operation changes
    pub kind: BulkOperationKind,
    /// Operation payload, opaque to the cache engine
    pub data: serde_json::Value,
}

/// Well-known inventory cache keys
pub mod keys {
    use super::*;

    /// Primary key for one item
    pub fn item(id: Uuid) -> CacheKey {
        CacheKey::domain(DOMAIN).push("items").push(id)
    }

    /// Full item collection
    pub fn items_all() -> CacheKey {
        CacheKey::domain(DOMAIN).push("items").push("all")
    }

    /// Items at or below their low-stock threshold
    pub fn items_low_stock() -> CacheKey {
        CacheKey::domain(DOMAIN).push("items").push("low-stock")
    }

    /// Items visible to storefront queries
    pub fn items_visible() -> CacheKey {
        CacheKey::domain(DOMAIN).push("items").push("visible")
    }

    /// Items in the active lifecycle state
    pub fn items_active() -> CacheKey {
        CacheKey::domain(DOMAIN).push("items").push("active")
    }

    /// Every collection key that may contain a given item
    pub fn collections() -> Vec<CacheKey> {
        vec![
            items_all(),
            items_low_stock(),
            items_visible(),
            items_active(),
        ]
    }

    /// Movement history scoped to one item
    pub fn movements(item_id: Uuid) -> CacheKey {
        CacheKey::domain(DOMAIN).push("movements").push(item_id)
    }

    /// Movement history scoped to a movement kind
    pub fn movements_by_kind(kind: MovementKind) -> CacheKey {
        CacheKey::domain(DOMAIN).push("movements").push(kind.as_str())
    }

    /// Aggregate / analytics rollup key (debounced invalidation target)
    pub fn aggregates() -> CacheKey {
        CacheKey::domain(DOMAIN).push("aggregates")
    }

    /// Cross-domain key for an order referencing inventory
    pub fn order(id: Uuid) -> CacheKey {
        CacheKey::domain("orders").push(id)
    }

    /// Cross-domain key for a product owning inventory items
    pub fn product(id: Uuid) -> CacheKey {
        CacheKey::domain("products").push(id)
    }
}

/// Cache-impact category tags
pub mod tags {
    /// Every inventory entry
    pub const INVENTORY: &str = "inventory";
    /// Collection / list entries
    pub const LISTS: &str = "inventory:list";
    /// The low-stock collection
    pub const LOW_STOCK: &str = "inventory:low-stock";
    /// The visible-items collection
    pub const VISIBLE: &str = "inventory:visible";
    /// The active-items collection
    pub const ACTIVE: &str = "inventory:active";
    /// Movement-history entries
    pub const MOVEMENTS: &str = "inventory:movements";
    /// Aggregate rollup entries
    pub const AGGREGATES: &str = "inventory:aggregates";

    use std::collections::HashSet;

    /// Tags attached to a cached item entry
    pub fn item_tags() -> HashSet<String> {
        [INVENTORY.to_string()].into()
    }

    /// Tags attached to a cached collection entry
    pub fn collection_tags(extra: &str) -> HashSet<String> {
        [
            INVENTORY.to_string(),
            LISTS.to_string(),
            extra.to_string(),
        ]
        .into()
    }
}
