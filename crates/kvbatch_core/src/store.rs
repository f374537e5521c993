//! Typed key-value store.

use crate::action::{Action, Transform};
use crate::batcher::Batcher;
use crate::config::Config;
use crate::error::{KvError, KvResult};
use crate::provider::Provider;
use futures::future::{self, BoxFuture, FutureExt};
use kvbatch_codec::{CborCodec, Codec};
use kvbatch_storage::{Engine, Key};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A key-value store whose operations are batched into shared transactions.
///
/// Every method enqueues its operation when called and returns a future
/// for the result. Operations issued before the caller next awaits run in
/// one read-write transaction, in the order they were issued. Awaiting is
/// only needed to observe the result; an un-awaited write still runs.
///
/// Values are encoded with `C`, CBOR by default.
///
/// # Example
///
/// ```rust
/// use kvbatch_core::{Config, KvStore};
/// use kvbatch_storage::MemoryEngine;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kvbatch_core::KvResult<()> {
/// let store = KvStore::open(Arc::new(MemoryEngine::new()), &Config::default());
///
/// let write = store.set("visits", &1u32);
/// let bump = store.update("visits", |n: Option<u32>| n.unwrap_or(0) + 1);
/// let read = store.get::<u32>("visits");
///
/// write.await?;
/// bump.await?;
/// assert_eq!(read.await?, Some(2));
/// # Ok(())
/// # }
/// ```
pub struct KvStore<C: Codec = CborCodec> {
    batcher: Arc<Batcher>,
    provider: Provider,
    codec: Arc<C>,
}

impl KvStore<CborCodec> {
    /// Opens a CBOR-encoded store on the table described by `config`.
    ///
    /// Nothing touches the engine until the first operation.
    pub fn open(engine: Arc<dyn Engine>, config: &Config) -> Self {
        Self::with_codec(engine, config, CborCodec)
    }
}

impl<C: Codec> KvStore<C> {
    /// Opens a store on the table described by `config`, encoding with `codec`.
    pub fn with_codec(engine: Arc<dyn Engine>, config: &Config, codec: C) -> Self {
        Self::from_provider(Provider::for_table(engine, config), codec)
    }

    /// Builds a store over an existing provider.
    ///
    /// Stores sharing a provider share its queue and cycles.
    pub fn from_provider(provider: Provider, codec: C) -> Self {
        Self {
            batcher: Batcher::global(),
            provider,
            codec: Arc::new(codec),
        }
    }

    /// Uses `batcher` instead of the process-wide one.
    #[must_use]
    pub fn with_batcher(mut self, batcher: Arc<Batcher>) -> Self {
        self.batcher = batcher;
        self
    }

    /// The provider this store batches on.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The value codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The batcher this store enqueues into.
    pub fn batcher(&self) -> &Arc<Batcher> {
        &self.batcher
    }

    /// Reads the value under `key`.
    pub fn get<V>(&self, key: impl Into<Key>) -> BoxFuture<'static, KvResult<Option<V>>>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let key = key.into();
        let codec = Arc::clone(&self.codec);
        self.batcher
            .enqueue_read(&self.provider, |respond| Action::Get { key, respond })
            .map(move |read| -> KvResult<Option<V>> {
                match read? {
                    Some(bytes) => Ok(Some(codec.decode(&bytes)?)),
                    None => Ok(None),
                }
            })
            .boxed()
    }

    /// Reads several values. Results follow the order of `keys`.
    pub fn get_many<K, V>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> BoxFuture<'static, KvResult<Vec<Option<V>>>>
    where
        K: Into<Key>,
        V: DeserializeOwned + Send + 'static,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        let codec = Arc::clone(&self.codec);
        self.batcher
            .enqueue_read(&self.provider, |respond| Action::GetMany { keys, respond })
            .map(move |read| -> KvResult<Vec<Option<V>>> {
                let decoded = read?
                    .into_iter()
                    .map(|value| value.map(|bytes| codec.decode(&bytes)).transpose())
                    .collect::<Result<_, _>>()?;
                Ok(decoded)
            })
            .boxed()
    }

    /// Stores `value` under `key`.
    ///
    /// Resolves once the transaction carrying the write commits. An encoding
    /// failure is reported without enqueueing anything.
    pub fn set<V>(&self, key: impl Into<Key>, value: &V) -> BoxFuture<'static, KvResult<()>>
    where
        V: Serialize + ?Sized,
    {
        let value = match self.codec.encode(value) {
            Ok(value) => value,
            Err(err) => return future::ready(Err(err.into())).boxed(),
        };
        self.write(Action::Set {
            key: key.into(),
            value,
        })
    }

    /// Stores several values, in iteration order.
    pub fn set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> BoxFuture<'static, KvResult<()>>
    where
        K: Into<Key>,
        V: Serialize,
    {
        let encoded: Result<Vec<(Key, Vec<u8>)>, _> = entries
            .into_iter()
            .map(|(key, value)| self.codec.encode(&value).map(|bytes| (key.into(), bytes)))
            .collect();
        match encoded {
            Ok(entries) => self.write(Action::SetMany { entries }),
            Err(err) => future::ready(Err(KvError::Codec(err))).boxed(),
        }
    }

    /// Replaces the value under `key` with `f(current)`.
    ///
    /// `f` runs inside the transaction and sees the effect of every
    /// operation issued before it. A value that fails to decode aborts the
    /// transaction.
    pub fn update<V, F>(&self, key: impl Into<Key>, f: F) -> BoxFuture<'static, KvResult<()>>
    where
        V: Serialize + DeserializeOwned + 'static,
        F: FnOnce(Option<V>) -> V + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let transform: Transform = Box::new(move |current: Option<Vec<u8>>| -> KvResult<Vec<u8>> {
            let current = current.map(|bytes| codec.decode::<V>(&bytes)).transpose()?;
            Ok(codec.encode(&f(current))?)
        });
        self.write(Action::Update {
            key: key.into(),
            transform,
        })
    }

    /// Removes `key`.
    pub fn delete(&self, key: impl Into<Key>) -> BoxFuture<'static, KvResult<()>> {
        self.write(Action::Delete { key: key.into() })
    }

    /// Removes several keys.
    pub fn delete_many<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> BoxFuture<'static, KvResult<()>>
    where
        K: Into<Key>,
    {
        self.write(Action::DeleteMany {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    /// Removes every key.
    pub fn clear(&self) -> BoxFuture<'static, KvResult<()>> {
        self.write(Action::Clear)
    }

    /// Lists every key in key order.
    pub fn keys(&self) -> BoxFuture<'static, KvResult<Vec<Key>>> {
        self.batcher
            .enqueue_read(&self.provider, |respond| Action::Keys { respond })
    }

    /// Lists every value in key order.
    pub fn values<V>(&self) -> BoxFuture<'static, KvResult<Vec<V>>>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        self.batcher
            .enqueue_read(&self.provider, |respond| Action::Values { respond })
            .map(move |read| -> KvResult<Vec<V>> {
                let decoded = read?
                    .iter()
                    .map(|bytes| codec.decode(bytes))
                    .collect::<Result<_, _>>()?;
                Ok(decoded)
            })
            .boxed()
    }

    /// Lists every key/value pair in key order.
    ///
    /// Fails as a whole if either enumeration fails.
    pub fn entries<V>(&self) -> BoxFuture<'static, KvResult<Vec<(Key, V)>>>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        self.batcher
            .enqueue_read(&self.provider, |respond| Action::Entries { respond })
            .map(move |read| -> KvResult<Vec<(Key, V)>> {
                let decoded = read?
                    .into_iter()
                    .map(|(key, bytes)| codec.decode(&bytes).map(|value| (key, value)))
                    .collect::<Result<_, _>>()?;
                Ok(decoded)
            })
            .boxed()
    }

    fn write(&self, action: Action) -> BoxFuture<'static, KvResult<()>> {
        self.batcher.enqueue_write(&self.provider, action).boxed()
    }
}

impl<C: Codec> Clone for KvStore<C> {
    fn clone(&self) -> Self {
        Self {
            batcher: Arc::clone(&self.batcher),
            provider: self.provider.clone(),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<C: Codec> fmt::Debug for KvStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStore")
            .field("provider", &self.provider.id())
            .field("codec", &self.codec.name())
            .finish()
    }
}
