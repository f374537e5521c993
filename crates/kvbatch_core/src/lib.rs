//! # kvbatch Core
//!
//! Automatic transaction batching for transactional key-value stores.
//!
//! Every operation is queued against its store's provider. The first
//! operation in a turn starts a commit cycle; every operation issued before
//! the caller next awaits joins that cycle and runs in the same read-write
//! transaction, in issue order.
//!
//! This crate provides:
//! - [`KvStore`], a typed store over any [`kvbatch_storage::Engine`]
//! - Free functions over a lazily created default store
//! - [`Batcher`], the per-provider queue and cycle registry
//! - [`settle`], the bridge from engine events to futures
//!
//! ## Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kvbatch_core::KvResult<()> {
//! let a = kvbatch_core::set("a", &1u32);
//! let b = kvbatch_core::set("b", &2u32);
//! let all = kvbatch_core::entries::<u32>();
//!
//! a.await?;
//! b.await?;
//! let all = all.await?;
//! assert_eq!(all.len(), 2);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod adapter;
mod batcher;
mod config;
mod error;
mod executor;
mod provider;
mod race;
mod store;

pub use action::{Action, Responder, Transform};
pub use adapter::{settle, Subscription};
pub use batcher::{Batcher, Cycle};
pub use config::{Config, DEFAULT_DB_NAME, DEFAULT_TABLE_NAME};
pub use error::{KvError, KvResult};
pub use executor::CycleState;
pub use provider::{HandleProvider, Provider, ProviderId, TableProvider};
pub use store::KvStore;

pub use kvbatch_codec::{CborCodec, Codec, JsonCodec};
pub use kvbatch_storage::{Key, MemoryEngine};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// The engine behind the default store.
///
/// Clones share data with the default store, which makes it possible to
/// inspect or fault the engine the free functions run on.
pub fn default_engine() -> MemoryEngine {
    static ENGINE: OnceLock<MemoryEngine> = OnceLock::new();
    ENGINE.get_or_init(MemoryEngine::new).clone()
}

/// The store used by the free functions.
///
/// Created on first use over [`default_engine`] with [`Config::default`].
pub fn default_store() -> &'static KvStore {
    static STORE: OnceLock<KvStore> = OnceLock::new();
    STORE.get_or_init(|| KvStore::open(Arc::new(default_engine()), &Config::default()))
}

/// Creates a CBOR-encoded store over the default engine.
///
/// Each call creates a new provider, so stores never share cycles, even
/// when `config` names the same table.
pub fn create_store(config: &Config) -> KvStore {
    KvStore::open(Arc::new(default_engine()), config)
}

/// Reads the value under `key` from the default store.
pub fn get<V>(key: impl Into<Key>) -> BoxFuture<'static, KvResult<Option<V>>>
where
    V: DeserializeOwned + Send + 'static,
{
    default_store().get(key)
}

/// Reads several values from the default store.
pub fn get_many<K, V>(keys: impl IntoIterator<Item = K>) -> BoxFuture<'static, KvResult<Vec<Option<V>>>>
where
    K: Into<Key>,
    V: DeserializeOwned + Send + 'static,
{
    default_store().get_many(keys)
}

/// Stores `value` under `key` in the default store.
pub fn set<V>(key: impl Into<Key>, value: &V) -> BoxFuture<'static, KvResult<()>>
where
    V: Serialize + ?Sized,
{
    default_store().set(key, value)
}

/// Stores several values in the default store.
pub fn set_many<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> BoxFuture<'static, KvResult<()>>
where
    K: Into<Key>,
    V: Serialize,
{
    default_store().set_many(entries)
}

/// Replaces the value under `key` in the default store with `f(current)`.
pub fn update<V, F>(key: impl Into<Key>, f: F) -> BoxFuture<'static, KvResult<()>>
where
    V: Serialize + DeserializeOwned + 'static,
    F: FnOnce(Option<V>) -> V + Send + 'static,
{
    default_store().update(key, f)
}

/// Removes `key` from the default store.
pub fn delete(key: impl Into<Key>) -> BoxFuture<'static, KvResult<()>> {
    default_store().delete(key)
}

/// Removes several keys from the default store.
pub fn delete_many<K>(keys: impl IntoIterator<Item = K>) -> BoxFuture<'static, KvResult<()>>
where
    K: Into<Key>,
{
    default_store().delete_many(keys)
}

/// Removes every key from the default store.
pub fn clear() -> BoxFuture<'static, KvResult<()>> {
    default_store().clear()
}

/// Lists the keys of the default store.
pub fn keys() -> BoxFuture<'static, KvResult<Vec<Key>>> {
    default_store().keys()
}

/// Lists the values of the default store.
pub fn values<V>() -> BoxFuture<'static, KvResult<Vec<V>>>
where
    V: DeserializeOwned + Send + 'static,
{
    default_store().values()
}

/// Lists the entries of the default store.
pub fn entries<V>() -> BoxFuture<'static, KvResult<Vec<(Key, V)>>>
where
    V: DeserializeOwned + Send + 'static,
{
    default_store().entries()
}
