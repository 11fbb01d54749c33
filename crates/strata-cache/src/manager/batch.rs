//! Batched invalidation for bulk operations
//!
//! N operations are collapsed into the union of their cache-impact
//! categories plus the set of distinct entity ids: one tag-invalidation
//! pass per category and one primary-key invalidation per id, never one
//! pass per input tuple.

use super::InventoryCacheManager;
use crate::domain::{keys, BulkOperation};
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use uuid::Uuid;

/// Summary of one batch-invalidation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInvalidationReport {
    /// Distinct entity ids whose primary keys were invalidated
    pub entity_passes: usize,
    /// Distinct impact categories invalidated by tag
    pub category_passes: usize,
    /// Total entries removed
    pub entries_removed: usize,
}

impl InventoryCacheManager {
    /// Invalidate the union of cache impact across a bulk mutation
    pub fn batch_invalidate(&self, operations: &[BulkOperation]) -> BatchInvalidationReport {
        let started = Instant::now();

        // BTreeSet keeps category passes deterministic for logging/tests.
        let mut categories: BTreeSet<&'static str> = BTreeSet::new();
        let mut ids: HashSet<Uuid> = HashSet::new();
        for op in operations {
            categories.extend(op.kind.impact_tags().iter().copied());
            ids.insert(op.entity_id);
        }

        let mut removed = 0;
        for id in &ids {
            removed += usize::from(self.layers().invalidate(&keys::item(*id)));
        }
        for category in &categories {
            removed += self.layers().invalidate_by_tags([*category]);
        }

        self.monitor()
            .record_invalidation(started.elapsed(), removed as u64);

        BatchInvalidationReport {
            entity_passes: ids.len(),
            category_passes: categories.len(),
            entries_removed: removed,
        }
    }
}
