//! Storage engine traits.

use crate::error::StoreResult;
use crate::key::Key;
use crate::request::{Completion, Request};
use std::sync::Arc;

/// Boxed, sendable future returned across the engine boundary.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Lookups only.
    ReadOnly,
    /// Lookups and mutations. Read-write transactions on the same table
    /// run one at a time, in the order they were requested.
    ReadWrite,
}

/// Schema operations available while a database is being bootstrapped.
pub trait Schema {
    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table already exists.
    fn create_table(&mut self, name: &str) -> StoreResult<()>;

    /// Returns true if the table exists.
    fn has_table(&self, name: &str) -> bool;
}

/// Bootstrap callback run once, when a database is first created.
pub type UpgradeFn = Box<dyn FnOnce(&mut dyn Schema) -> StoreResult<()> + Send>;

/// A storage engine holding named databases.
pub trait Engine: Send + Sync {
    /// Opens the database `name`.
    ///
    /// If the database does not exist yet, `upgrade` runs exactly once to
    /// create its tables before the request succeeds. If `upgrade` fails
    /// the database is not created and the request fails.
    fn open(&self, name: &str, upgrade: UpgradeFn) -> Request<Arc<dyn Connection>>;
}

/// An open database connection.
pub trait Connection: Send + Sync {
    /// Name of the database.
    fn name(&self) -> &str;

    /// Starts a transaction on `table`.
    ///
    /// For [`Mode::ReadWrite`] the future resolves once every earlier
    /// read-write transaction on the table has finished.
    fn transaction(&self, table: &str, mode: Mode)
        -> BoxFuture<'static, StoreResult<Box<dyn Transaction>>>;

    /// Closes the connection. Later transactions fail.
    fn close(&self);
}

/// A transaction scoped to one table.
///
/// Each operation returns a [`Request`] that settles exactly once. A failed
/// mutation aborts the whole transaction; a failed lookup fails only its
/// own request. Nothing is written until [`Transaction::commit`].
pub trait Transaction: Send + Sync {
    /// Access mode of this transaction.
    fn mode(&self) -> Mode;

    /// Returns true until the transaction commits or aborts.
    fn is_active(&self) -> bool;

    /// Looks up one value.
    fn get(&self, key: &Key) -> Request<Option<Vec<u8>>>;

    /// Enumerates all keys in key order.
    fn get_all_keys(&self) -> Request<Vec<Key>>;

    /// Enumerates all values in key order.
    fn get_all(&self) -> Request<Vec<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, value: Vec<u8>, key: Key) -> Request<Key>;

    /// Removes `key` if present.
    fn delete(&self, key: &Key) -> Request<()>;

    /// Removes every entry.
    fn clear(&self) -> Request<()>;

    /// Commits. Completion fires `Complete`, or `Abort` if the engine
    /// refuses the commit. No-op when already finished.
    fn commit(&self);

    /// Aborts, discarding all mutations. No-op when already finished.
    fn abort(&self, reason: &str);

    /// Completion events of this transaction.
    fn completion(&self) -> Completion;
}
