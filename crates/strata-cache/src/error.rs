//! Error types for the Strata cache engine

use thiserror::Error;

/// Result type alias using the Strata cache Error
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache coordination
///
/// Collaborator failures (`Remote`, `Mutation`) propagate to the caller
/// after the engine has restored a consistent local state. Best-effort
/// failures (a single key failing to invalidate, a warm fetch failing)
/// never surface here; they are counted by the performance monitor and
/// logged instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote fetch failure while populating a miss or warming
    #[error("Remote fetch error: {0}")]
    Remote(String),

    /// Remote mutation failure; the optimistic patch has been rolled back
    #[error("Mutation error: {0}")]
    Mutation(String),

    /// Write targeted a layer name that is not configured
    #[error("Unknown cache layer: {0}")]
    UnknownLayer(String),

    /// Operation requires a cached snapshot that is not present
    #[error("Not cached: {0}")]
    NotCached(String),

    /// A patch referenced an unknown pending operation or malformed field
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// Entity payload failed to (de)serialize at the manager boundary
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a remote fetch error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a mutation error
    pub fn mutation(msg: impl Into<String>) -> Self {
        Self::Mutation(msg.into())
    }

    /// Create a not-cached error
    pub fn not_cached(msg: impl Into<String>) -> Self {
        Self::NotCached(msg.into())
    }

    /// Create an invalid-patch error
    pub fn invalid_patch(msg: impl Into<String>) -> Self {
        Self::InvalidPatch(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
