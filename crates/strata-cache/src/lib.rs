//! Strata Cache - Layered Client-Side Cache Coordination Engine
//!
//! This crate keeps locally held copies of remote entities consistent
//! under concurrent mutation, optimistic updates, and asynchronous
//! real-time change notifications. It implements:
//! - Bounded cache stores with TTL and LRU/LFU/FIFO eviction
//! - A tag index for bulk invalidation by category
//! - Multi-layer composition with read-through promotion
//! - A symmetric relation graph for cross-entity invalidation fan-out
//! - A domain manager with smart invalidation, optimistic rollback,
//!   real-time patch application, batch invalidation, and warming
//! - Counter-based performance monitoring with threshold analysis
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        InventoryCacheManager                 │
//! │ (smart invalidation, optimistic, realtime,  │
//! │        batch, warming, debounce)            │
//! └──────┬───────────────────┬──────────────────┘
//!        │                   │
//! ┌──────┴─────────┐  ┌──────┴──────────────────┐
//! │ CacheCoordinator│  │   PerformanceMonitor    │
//! │ (relation graph,│  │ (hits/misses/latency,   │
//! │  pattern rules) │  │  health analysis)       │
//! └──────┬─────────┘  └─────────────────────────┘
//!        │
//! ┌──────┴──────────────────────────────────────┐
//! │            MultiLayerCache                   │
//! │    (fast → medium → long, promotion)        │
//! └──────┬──────────────────────────────────────┘
//!        │
//! ┌──────┴──────────────────────────────────────┐
//! │     CacheStore (TTL, eviction, TagIndex)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All cache state is owned by the manager instance constructed for a
//! session: no globals, no hidden singletons, full per-test and
//! per-tenant isolation.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod error;
pub mod key;
pub mod layers;
pub mod manager;
pub mod monitor;
pub mod relations;
pub mod store;
pub mod tags;

pub use error::{Error, Result};
pub use key::{CacheKey, Segment};
pub use layers::MultiLayerCache;
pub use manager::{
    BatchInvalidationReport, CrossEntityOutcome, InventoryCacheManager, ManagerConfig,
    OperationId, StockUpdateReport,
};
pub use monitor::{CacheHealth, CacheMetrics, PerformanceAnalysis, PerformanceMonitor};
pub use relations::{CacheCoordinator, RelationGraph, RelationRule};
pub use store::{CacheStore, EvictionPolicy, StoreConfig, StoreStats};
pub use tags::TagIndex;
