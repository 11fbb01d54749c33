//! Predictive warming and prefetch
//!
//! Warming is advisory: fetches run concurrently in background tasks,
//! individual failures are swallowed (counted against the best-effort
//! channel), and successful values land in the slowest layer under a
//! longer-than-default TTL so they survive until first access promotes
//! them.

use super::InventoryCacheManager;
use crate::domain::{self, keys};
use crate::error::Result;
use crate::key::CacheKey;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::debug;
use uuid::Uuid;

impl InventoryCacheManager {
    /// Warm the primary keys of frequently accessed items plus the common
    /// collection keys; returns the number of entries populated
    pub async fn warm<F, Fut>(&self, ids: &[Uuid], fetch: F) -> Result<usize>
    where
        F: Fn(CacheKey) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let mut targets: Vec<(CacheKey, HashSet<String>)> = ids
            .iter()
            .map(|id| (keys::item(*id), domain::tags::item_tags()))
            .collect();
        for key in keys::collections() {
            let tags = super::collection_tags_for(&key);
            targets.push((key, tags));
        }

        let layer = self.slowest_layer()?.to_string();
        let ttl = self.config().warm_ttl;
        self.populate(targets, &layer, Some(ttl), fetch).await
    }

    /// Fetch-and-populate arbitrary keys into the fastest layer under its
    /// default TTL; failures are swallowed
    pub async fn prefetch<F, Fut>(&self, prefetch_keys: Vec<CacheKey>, fetch: F) -> Result<usize>
    where
        F: Fn(CacheKey) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let fastest = self
            .config()
            .layers
            .first()
            .map(|l| l.name.clone())
            .ok_or_else(|| crate::error::Error::internal("manager configured with no layers"))?;
        let targets = prefetch_keys
            .into_iter()
            .map(|key| (key, HashSet::new()))
            .collect();
        self.populate(targets, &fastest, None, fetch).await
    }

    /// Fire all fetches concurrently, wait for all, and apply each
    /// successful value as one atomic in-memory write
    async fn populate<F, Fut>(
        &self,
        targets: Vec<(CacheKey, HashSet<String>)>,
        layer: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<usize>
    where
        F: Fn(CacheKey) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (key, tags) in targets {
            let fetch = fetch.clone();
            tasks.spawn(async move {
                let result = fetch(key.clone()).await;
                (key, tags, result)
            });
        }

        let mut populated = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, tags, Ok(value))) => {
                    self.layers().set(key, value, Some(layer), ttl, tags)?;
                    populated += 1;
                }
                Ok((key, _, Err(err))) => {
                    debug!(key = %key, error = %err, "warm fetch failed; skipping");
                    self.monitor().record_best_effort_failure();
                }
                Err(join_err) => {
                    debug!(error = %join_err, "warm task failed; skipping");
                    self.monitor().record_best_effort_failure();
                }
            }
        }
        Ok(populated)
    }
}
