//! Error types for the dedup store

use thiserror::Error;

/// Result type for dedup operations
pub type DedupResult<T> = Result<T, DedupError>;

/// Errors that can occur while recording message identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DedupError {
    /// The store is full; the identifier was not recorded.
    ///
    /// This is a degraded state, not a failure: the message is still handled,
    /// it just cannot be recognised as a duplicate later.
    #[error("Dedup store capacity of {capacity} identifiers reached")]
    CapacityExceeded { capacity: usize },
}
