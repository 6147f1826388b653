//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Lookups never fail: a
//! missing key is reported through `Option`/`bool`, so the only errors are
//! rejected configuration and the I/O of the export collaborator.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Capacity must be at least one entry
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    /// No tokio runtime to host the expiration task
    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Snapshot file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
