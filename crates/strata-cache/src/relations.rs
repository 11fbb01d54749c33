//! Relation-aware cross-entity invalidation
//!
//! A `RelationGraph` stores symmetric edges between cache keys: if
//! invalidating A should also invalidate B, the edge exists in both
//! directions by construction. On top of the dynamic edges, static
//! `RelationRule`s derive related keys from a key's shape (e.g. a content
//! item key maps to the campaign and bundle keys referencing it). The
//! coordinator fans an invalidation out across the whole reachable set;
//! every per-key step is best-effort — a failure is logged and counted but
//! never aborts the remaining keys, since correctness is re-established by
//! the next fetch from source.

use crate::error::Result;
use crate::key::CacheKey;
use crate::layers::MultiLayerCache;
use crate::monitor::PerformanceMonitor;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Symmetric adjacency between cache keys
#[derive(Debug, Default)]
pub struct RelationGraph {
    adjacency: HashMap<CacheKey, HashSet<CacheKey>>,
}

impl RelationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge in both directions
    pub fn register(&mut self, a: CacheKey, b: CacheKey) {
        if a == b {
            return;
        }
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone());
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Direct neighbors of a key
    pub fn related(&self, key: &CacheKey) -> HashSet<CacheKey> {
        self.adjacency.get(key).cloned().unwrap_or_default()
    }

    /// Every key reachable from `key` over registered edges, excluding
    /// `key` itself
    pub fn reachable(&self, key: &CacheKey) -> HashSet<CacheKey> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&CacheKey> = VecDeque::new();
        queue.push_back(key);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.adjacency.get(current) {
                for neighbor in neighbors {
                    if neighbor != key && seen.insert(neighbor.clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        seen
    }

    /// Remove a key and all edges touching it
    pub fn remove_key(&mut self, key: &CacheKey) {
        if let Some(neighbors) = self.adjacency.remove(key) {
            for neighbor in neighbors {
                if let Some(back) = self.adjacency.get_mut(&neighbor) {
                    back.remove(key);
                    if back.is_empty() {
                        self.adjacency.remove(&neighbor);
                    }
                }
            }
        }
    }

    /// Number of keys with at least one edge
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

/// A static, pre-declared mapping from a key to related keys
///
/// Rule evaluation may consult cached state and is allowed to fail; a
/// failed rule is counted against the best-effort channel and skipped.
pub struct RelationRule {
    name: String,
    derive: Box<dyn Fn(&CacheKey) -> Result<Vec<CacheKey>> + Send + Sync>,
}

impl RelationRule {
    /// Create a named rule
    pub fn new(
        name: impl Into<String>,
        derive: impl Fn(&CacheKey) -> Result<Vec<CacheKey>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            derive: Box::new(derive),
        }
    }

    /// Rule name, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Fans invalidations out across rule-derived and graph-related keys
pub struct CacheCoordinator {
    layers: Arc<MultiLayerCache>,
    monitor: Arc<PerformanceMonitor>,
    graph: RwLock<RelationGraph>,
    rules: RwLock<Vec<RelationRule>>,
}

impl CacheCoordinator {
    /// Create a coordinator over the given layers and monitor
    pub fn new(layers: Arc<MultiLayerCache>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            layers,
            monitor,
            graph: RwLock::new(RelationGraph::new()),
            rules: RwLock::new(Vec::new()),
        }
    }

    /// Register a symmetric relation edge between two keys
    pub fn register_relation(&self, a: CacheKey, b: CacheKey) {
        self.graph.write().register(a, b);
    }

    /// Install a static pattern rule
    pub fn add_rule(&self, rule: RelationRule) {
        self.rules.write().push(rule);
    }

    /// Keys that an invalidation of `key` must also hit: rule-derived keys
    /// plus everything reachable over dynamic edges
    pub fn related_keys(&self, key: &CacheKey) -> HashSet<CacheKey> {
        let mut related = self.graph.read().reachable(key);

        for rule in self.rules.read().iter() {
            match (rule.derive)(key) {
                Ok(keys) => related.extend(keys.into_iter().filter(|k| k != key)),
                Err(err) => {
                    warn!(rule = rule.name(), key = %key, error = %err,
                          "relation rule failed; skipping");
                    self.monitor.record_best_effort_failure();
                }
            }
        }
        related
    }

    /// Invalidate `key` and everything related to it
    ///
    /// Related keys are invalidated first, the primary key last, so a
    /// reader racing the fan-out never sees a fresh primary alongside stale
    /// dependents. Returns the number of entries removed.
    pub fn invalidate_related(&self, key: &CacheKey) -> usize {
        let started = Instant::now();
        let removed = self.fan_out(key);
        self.monitor
            .record_invalidation(started.elapsed(), removed as u64);
        removed
    }

    /// Fan-out without recording a monitor pass; callers folding this into
    /// a larger invalidation record the combined total once themselves
    pub(crate) fn fan_out(&self, key: &CacheKey) -> usize {
        let related = self.related_keys(key);
        let mut removed = 0;

        for related_key in &related {
            if self.layers.invalidate(related_key) {
                debug!(key = %related_key, primary = %key, "invalidated related key");
                removed += 1;
            }
        }

        if self.layers.invalidate(key) {
            removed += 1;
        }
        removed
    }

    /// Drop every registered edge (rules are kept)
    pub fn clear_relations(&self) {
        *self.graph.write() = RelationGraph::new();
    }
}
