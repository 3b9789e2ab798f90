use thiserror::Error;

use crate::core::DbError;

/// Errors surfaced to callers of the review core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    /// Precondition failure in the request; never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store '{0}' not found")]
    StoreNotFound(String),

    /// Every allowed attempt hit a concurrent commit or timed out
    #[error("Transaction conflict: gave up after {attempts} attempt(s)")]
    TransactionConflict { attempts: usize },

    /// The stored aggregate could not be decoded; it is never repaired here
    #[error("Corrupt aggregate for store '{store_id}': {reason}")]
    CorruptAggregate { store_id: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Submission cancelled before commit")]
    Cancelled,

    /// Non-conflict failure of the persistence layer
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl ReviewError {
    /// Whether the caller may reasonably try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionConflict { .. } | Self::QueryFailed(_)
        )
    }
}
