//! Error types for kvbatch core.

use kvbatch_codec::CodecError;
use kvbatch_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors returned by store operations.
///
/// `Clone` because one cycle outcome is handed to every caller that joined
/// the cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KvError {
    /// The database could not be opened or its table bootstrapped.
    #[error("failed to open store: {0}")]
    Open(StoreError),

    /// The engine reported an error for a request or transaction.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The commit cycle could not run.
    #[error("runtime error: {message}")]
    Runtime {
        /// Description of the failure.
        message: String,
    },

    /// The request was discarded without a result.
    #[error("request dropped before it was serviced")]
    Dropped,
}

impl KvError {
    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Returns true if the error came from a transaction abort.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl From<StoreError> for KvError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Aborted { reason } => Self::Aborted { reason },
            StoreError::Open(_) => Self::Open(err),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_abort_maps_to_aborted() {
        let err = KvError::from(StoreError::aborted("boom"));
        assert_eq!(err, KvError::aborted("boom"));
        assert!(err.is_aborted());
    }

    #[test]
    fn store_open_maps_to_open() {
        let err = KvError::from(StoreError::Open("gone".into()));
        assert!(matches!(err, KvError::Open(_)));
    }

    #[test]
    fn other_store_errors_pass_through() {
        let err = KvError::from(StoreError::ReadOnly);
        assert_eq!(err, KvError::Store(StoreError::ReadOnly));
        assert_eq!(err.to_string(), "storage error: transaction is read-only");
    }
}
