//! Error types for index operations.
//!
//! Stale writes and disabled operations are not errors: they are reported as
//! `Ok(false)` because they are expected outcomes under concurrent writers.

use crate::lock::LockError;
use thiserror::Error;

/// Errors returned by the index, the exact view and snapshot persistence.
#[derive(Debug, Error)]
pub enum HnswError {
    /// The vector length does not match the index dimensionality.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Every node slot is allocated. Deleted slots are never reused.
    #[error("index capacity of {capacity} items exhausted")]
    CapacityExhausted { capacity: usize },

    /// Construction parameters are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A zero-length vector cannot be normalized.
    #[error("cannot normalize a zero vector")]
    ZeroVector,

    /// The locking protocol was violated.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The item iterator ran out of slots before yielding every live item.
    #[error("item iterator exhausted storage after {yielded} of {expected} live items")]
    IteratorExhausted { yielded: usize, expected: usize },

    /// Internal state is inconsistent (snapshot validation, missing slots).
    #[error("corrupt index state: {0}")]
    Corrupt(String),

    /// A spawned insert task panicked or was cancelled.
    #[error("insert task failed: {0}")]
    TaskFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for HnswError {
    fn from(err: bincode::Error) -> Self {
        HnswError::Serialization(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HnswError>;
