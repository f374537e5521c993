//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a storage engine.
///
/// Errors are `Clone` because a single transaction failure is delivered
/// to every request and listener that observes it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The database could not be opened or bootstrapped.
    #[error("open failed: {0}")]
    Open(String),

    /// The requested table does not exist in the database.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the missing table.
        name: String,
    },

    /// The table already exists.
    #[error("table already exists: {name}")]
    TableExists {
        /// Name of the duplicate table.
        name: String,
    },

    /// A mutation was issued on a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction has already committed or aborted.
    #[error("transaction is not active")]
    TransactionInactive,

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// A single request failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,
}

impl StoreError {
    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a request failure.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}
