//! Cache performance monitoring
//!
//! Counters for hits, misses, invalidations, and optimistic updates, each
//! with accumulated latency and affected-item counts, plus a best-effort
//! failure counter so skipped cross-entity invalidations and failed warm
//! fetches are observable instead of silently dropped. The analysis
//! accessor classifies overall health from fixed thresholds and is a pure
//! function of the counters at the moment of the call.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Average-latency bound (ms) under which a healthy hit rate counts as
/// excellent
const FAST_RESPONSE_MS: f64 = 50.0;
/// Average-latency bound (ms) for the "good" classification
const ACCEPTABLE_RESPONSE_MS: f64 = 100.0;

/// Overall cache health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheHealth {
    /// Hit rate at or above 0.8 with fast average responses
    Excellent,
    /// Hit rate at or above 0.6 with acceptable average responses
    Good,
    /// Hit rate at or above 0.4
    Fair,
    /// Hit rate below 0.4
    Poor,
}

/// Raw counter snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Reads served from cache
    pub hits: u64,
    /// Reads that fell through to the source
    pub misses: u64,
    /// Invalidation passes executed
    pub invalidations: u64,
    /// Optimistic updates applied
    pub optimistic_updates: u64,
    /// Optimistic updates rolled back after a failed mutation
    pub rollbacks: u64,
    /// Entries removed across all invalidation passes
    pub items_invalidated: u64,
    /// Best-effort failures (skipped cross-entity fan-out, failed warm
    /// fetch, failed per-key invalidation)
    pub best_effort_failures: u64,
    /// hits + misses
    pub total_operations: u64,
    /// hits / (hits + misses); 0.0 when nothing was recorded
    pub hit_rate: f64,
    /// Mean observed latency across all recorded operations, in ms
    pub avg_latency_ms: f64,
}

/// Threshold-based health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    /// Overall classification
    pub health: CacheHealth,
    /// Human-readable observations
    pub highlights: Vec<String>,
    /// Human-readable suggested actions
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default)]
struct MonitorInner {
    hits: u64,
    misses: u64,
    invalidations: u64,
    optimistic_updates: u64,
    rollbacks: u64,
    items_invalidated: u64,
    best_effort_failures: u64,
    total_latency: Duration,
    latency_samples: u64,
}

/// Counter sink shared by the stores, coordinator, and manager
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    inner: RwLock<MonitorInner>,
}

impl PerformanceMonitor {
    /// Create a monitor with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit with its observed latency
    pub fn record_hit(&self, latency: Duration) {
        let mut inner = self.inner.write();
        inner.hits += 1;
        inner.total_latency += latency;
        inner.latency_samples += 1;
    }

    /// Record a cache miss with its observed latency
    pub fn record_miss(&self, latency: Duration) {
        let mut inner = self.inner.write();
        inner.misses += 1;
        inner.total_latency += latency;
        inner.latency_samples += 1;
    }

    /// Record one invalidation pass and how many entries it removed
    pub fn record_invalidation(&self, latency: Duration, affected: u64) {
        let mut inner = self.inner.write();
        inner.invalidations += 1;
        inner.items_invalidated += affected;
        inner.total_latency += latency;
        inner.latency_samples += 1;
    }

    /// Record an applied optimistic update
    pub fn record_optimistic_update(&self, latency: Duration) {
        let mut inner = self.inner.write();
        inner.optimistic_updates += 1;
        inner.total_latency += latency;
        inner.latency_samples += 1;
    }

    /// Record a rollback of a previously applied optimistic update
    pub fn record_rollback(&self) {
        self.inner.write().rollbacks += 1;
    }

    /// Record a best-effort failure (never propagated to callers)
    pub fn record_best_effort_failure(&self) {
        self.inner.write().best_effort_failures += 1;
    }

    /// Snapshot the counters
    pub fn metrics(&self) -> CacheMetrics {
        let inner = self.inner.read();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        let avg_latency_ms = if inner.latency_samples == 0 {
            0.0
        } else {
            inner.total_latency.as_secs_f64() * 1000.0 / inner.latency_samples as f64
        };

        CacheMetrics {
            hits: inner.hits,
            misses: inner.misses,
            invalidations: inner.invalidations,
            optimistic_updates: inner.optimistic_updates,
            rollbacks: inner.rollbacks,
            items_invalidated: inner.items_invalidated,
            best_effort_failures: inner.best_effort_failures,
            total_operations: total,
            hit_rate,
            avg_latency_ms,
        }
    }

    /// Classify health from the current counters
    pub fn analysis(&self) -> PerformanceAnalysis {
        let metrics = self.metrics();
        let mut highlights = Vec::new();
        let mut recommendations = Vec::new();

        let health = if metrics.hit_rate >= 0.8 && metrics.avg_latency_ms < FAST_RESPONSE_MS {
            CacheHealth::Excellent
        } else if metrics.hit_rate >= 0.6 && metrics.avg_latency_ms < ACCEPTABLE_RESPONSE_MS {
            CacheHealth::Good
        } else if metrics.hit_rate >= 0.4 {
            CacheHealth::Fair
        } else {
            CacheHealth::Poor
        };

        highlights.push(format!(
            "Hit rate {:.1}% over {} operations",
            metrics.hit_rate * 100.0,
            metrics.total_operations
        ));
        highlights.push(format!(
            "Average latency {:.2}ms",
            metrics.avg_latency_ms
        ));

        if metrics.total_operations == 0 {
            recommendations
                .push("No cache traffic recorded yet; metrics are inconclusive".to_string());
        }
        if metrics.total_operations > 0 && metrics.hit_rate < 0.6 {
            recommendations.push(
                "Hit rate is low; consider warming frequently accessed entities or raising TTLs"
                    .to_string(),
            );
        }
        if metrics.avg_latency_ms >= ACCEPTABLE_RESPONSE_MS {
            recommendations.push(
                "Average latency is high; check remote fetch latency and layer sizing".to_string(),
            );
        }
        if metrics.best_effort_failures > 0 {
            highlights.push(format!(
                "{} best-effort failures (skipped fan-out or failed warm fetches)",
                metrics.best_effort_failures
            ));
        }
        if metrics.rollbacks > 0 {
            highlights.push(format!(
                "{} optimistic updates rolled back",
                metrics.rollbacks
            ));
        }

        PerformanceAnalysis {
            health,
            highlights,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_math() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..8 {
            monitor.record_hit(Duration::from_millis(1));
        }
        for _ in 0..2 {
            monitor.record_miss(Duration::from_millis(1));
        }

        let metrics = monitor.metrics();
        assert_eq!(metrics.total_operations, 10);
        assert!((metrics.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_monitor_reports_zero() {
        let metrics = PerformanceMonitor::new().metrics();
        assert_eq!(metrics.total_operations, 0);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_excellent_classification() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..9 {
            monitor.record_hit(Duration::from_millis(5));
        }
        monitor.record_miss(Duration::from_millis(5));

        assert_eq!(monitor.analysis().health, CacheHealth::Excellent);
    }

    #[test]
    fn test_good_requires_acceptable_latency() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..7 {
            monitor.record_hit(Duration::from_millis(80));
        }
        for _ in 0..3 {
            monitor.record_miss(Duration::from_millis(80));
        }

        // Hit rate 0.7 with 80ms average: not excellent, still good.
        assert_eq!(monitor.analysis().health, CacheHealth::Good);
    }

    #[test]
    fn test_poor_classification_recommends_warming() {
        let monitor = PerformanceMonitor::new();
        monitor.record_hit(Duration::from_millis(1));
        for _ in 0..9 {
            monitor.record_miss(Duration::from_millis(1));
        }

        let analysis = monitor.analysis();
        assert_eq!(analysis.health, CacheHealth::Poor);
        assert!(analysis
            .recommendations
            .iter()
            .any(|r| r.contains("warming")));
    }

    #[test]
    fn test_invalidation_and_best_effort_counters() {
        let monitor = PerformanceMonitor::new();
        monitor.record_invalidation(Duration::from_millis(2), 5);
        monitor.record_best_effort_failure();

        let metrics = monitor.metrics();
        assert_eq!(metrics.invalidations, 1);
        assert_eq!(metrics.items_invalidated, 5);
        assert_eq!(metrics.best_effort_failures, 1);
        // Invalidations are not reads and must not skew the hit rate.
        assert_eq!(metrics.total_operations, 0);
    }
}
