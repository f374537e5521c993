//! Queued operations.

use crate::error::KvResult;
use kvbatch_storage::Key;
use std::fmt;
use tokio::sync::oneshot;

/// Sender half bound to a read caller's future.
pub type Responder<T> = oneshot::Sender<KvResult<T>>;

/// Encoded-value transform applied by [`Action::Update`].
///
/// Receives the current encoded value (if any) and returns the encoded
/// replacement. An error aborts the transaction.
pub type Transform = Box<dyn FnOnce(Option<Vec<u8>>) -> KvResult<Vec<u8>> + Send>;

/// One requested operation awaiting a commit cycle.
///
/// Reads carry a [`Responder`]; writes report only through the cycle.
pub enum Action {
    /// Read one value.
    Get {
        /// Key to read.
        key: Key,
        /// Receives the value.
        respond: Responder<Option<Vec<u8>>>,
    },
    /// Read several values, in key order of the request.
    GetMany {
        /// Keys to read.
        keys: Vec<Key>,
        /// Receives the values.
        respond: Responder<Vec<Option<Vec<u8>>>>,
    },
    /// Enumerate keys.
    Keys {
        /// Receives the keys.
        respond: Responder<Vec<Key>>,
    },
    /// Enumerate values.
    Values {
        /// Receives the values.
        respond: Responder<Vec<Vec<u8>>>,
    },
    /// Enumerate key/value pairs.
    Entries {
        /// Receives the pairs.
        respond: Responder<Vec<(Key, Vec<u8>)>>,
    },
    /// Store one value.
    Set {
        /// Target key.
        key: Key,
        /// Encoded value.
        value: Vec<u8>,
    },
    /// Store several values, in order.
    SetMany {
        /// Key/encoded value pairs.
        entries: Vec<(Key, Vec<u8>)>,
    },
    /// Read-modify-write one value.
    Update {
        /// Target key.
        key: Key,
        /// Transform from the current value to the new one.
        transform: Transform,
    },
    /// Remove one key.
    Delete {
        /// Key to remove.
        key: Key,
    },
    /// Remove several keys.
    DeleteMany {
        /// Keys to remove.
        keys: Vec<Key>,
    },
    /// Remove every key.
    Clear,
}

impl Action {
    /// Name of the operation, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Get { .. } => "get",
            Action::GetMany { .. } => "get_many",
            Action::Keys { .. } => "keys",
            Action::Values { .. } => "values",
            Action::Entries { .. } => "entries",
            Action::Set { .. } => "set",
            Action::SetMany { .. } => "set_many",
            Action::Update { .. } => "update",
            Action::Delete { .. } => "delete",
            Action::DeleteMany { .. } => "delete_many",
            Action::Clear => "clear",
        }
    }

    /// Returns true for operations that settle their own caller.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Action::Get { .. }
                | Action::GetMany { .. }
                | Action::Keys { .. }
                | Action::Values { .. }
                | Action::Entries { .. }
        )
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Get { key, .. }
            | Action::Set { key, .. }
            | Action::Update { key, .. }
            | Action::Delete { key } => write!(f, "{}({key})", self.name()),
            Action::GetMany { keys, .. } | Action::DeleteMany { keys } => {
                write!(f, "{}({} keys)", self.name(), keys.len())
            }
            Action::SetMany { entries } => write!(f, "set_many({} entries)", entries.len()),
            _ => f.write_str(self.name()),
        }
    }
}
