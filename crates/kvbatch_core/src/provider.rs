//! Handle providers.
//!
//! A provider turns a [`Mode`] into a transaction on one logical table.
//! Its identity, not the table it points at, decides which queue and cycle
//! an operation belongs to.

use crate::adapter::settle;
use crate::config::Config;
use crate::error::{KvError, KvResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use kvbatch_storage::{Connection, Engine, Mode, Schema, Transaction, UpgradeFn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Unique identity of a [`Provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

/// Produces transactions on one logical table.
///
/// Implementations know nothing about batching; they are asked for a
/// read-write handle once per commit cycle.
pub trait HandleProvider: Send + Sync {
    /// Opens a transaction in `mode`.
    fn handle(&self, mode: Mode) -> BoxFuture<'static, KvResult<Box<dyn Transaction>>>;
}

/// A handle provider with an identity.
///
/// Clones share the identity. Two providers built separately are distinct
/// even if they address the same table, and never share a cycle.
#[derive(Clone)]
pub struct Provider {
    id: ProviderId,
    inner: Arc<dyn HandleProvider>,
}

impl Provider {
    /// Wraps `provider` under a fresh identity.
    pub fn new(provider: impl HandleProvider + 'static) -> Self {
        Self {
            id: ProviderId::next(),
            inner: Arc::new(provider),
        }
    }

    /// Builds a provider for the table described by `config`.
    pub fn for_table(engine: Arc<dyn Engine>, config: &Config) -> Self {
        Self::new(TableProvider::new(engine, config))
    }

    /// Identity of this provider.
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Opens a transaction in `mode`.
    pub fn handle(&self, mode: Mode) -> BoxFuture<'static, KvResult<Box<dyn Transaction>>> {
        self.inner.handle(mode)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("id", &self.id).finish()
    }
}

/// Provider over a named table of an [`Engine`].
///
/// The connection is opened on first use and shared by every later
/// transaction. Opening creates the table when the database is new. A
/// failed open is not remembered; the next call tries again.
pub struct TableProvider {
    engine: Arc<dyn Engine>,
    db_name: String,
    table_name: String,
    connection: Arc<OnceCell<Arc<dyn Connection>>>,
}

impl TableProvider {
    /// Creates a provider for `config.table_name` in `config.db_name`.
    pub fn new(engine: Arc<dyn Engine>, config: &Config) -> Self {
        Self {
            engine,
            db_name: config.db_name.clone(),
            table_name: config.table_name.clone(),
            connection: Arc::new(OnceCell::new()),
        }
    }

    /// Database name.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

async fn open_connection(
    engine: Arc<dyn Engine>,
    db_name: String,
    table_name: String,
) -> KvResult<Arc<dyn Connection>> {
    let db = db_name.clone();
    let upgrade: UpgradeFn = Box::new(move |schema: &mut dyn Schema| {
        info!(db = %db, table = %table_name, "bootstrapping table");
        schema.create_table(&table_name)
    });
    settle(engine.open(&db_name, upgrade))
        .await
        .map_err(KvError::Open)
}

impl HandleProvider for TableProvider {
    fn handle(&self, mode: Mode) -> BoxFuture<'static, KvResult<Box<dyn Transaction>>> {
        let engine = Arc::clone(&self.engine);
        let cell = Arc::clone(&self.connection);
        let db_name = self.db_name.clone();
        let table_name = self.table_name.clone();

        async move {
            let connection = cell
                .get_or_try_init(|| open_connection(engine, db_name, table_name.clone()))
                .await?;
            connection
                .transaction(&table_name, mode)
                .await
                .map_err(KvError::from)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvbatch_storage::{MemoryEngine, StoreError};

    fn table_provider(engine: &MemoryEngine) -> TableProvider {
        TableProvider::new(
            Arc::new(engine.clone()),
            &Config::new().db_name("db").table_name("kv"),
        )
    }

    #[test]
    fn providers_have_distinct_ids() {
        let engine = MemoryEngine::new();
        let a = Provider::new(table_provider(&engine));
        let b = Provider::new(table_provider(&engine));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[tokio::test]
    async fn bootstraps_once_and_reuses_connection() {
        let engine = MemoryEngine::new();
        let provider = table_provider(&engine);

        let first = provider.handle(Mode::ReadWrite).await.unwrap();
        first.commit();
        let second = provider.handle(Mode::ReadOnly).await.unwrap();

        assert_eq!(second.mode(), Mode::ReadOnly);
        assert_eq!(engine.opens(), 1);
        assert_eq!(engine.upgrades(), 1);
        assert_eq!(engine.transactions_started(), 2);
    }

    #[tokio::test]
    async fn failed_open_is_retried() {
        let engine = MemoryEngine::new();
        engine.fail_next_open("locked");
        let provider = table_provider(&engine);

        let err = provider.handle(Mode::ReadWrite).await.err().unwrap();
        assert_eq!(err, KvError::Open(StoreError::Open("locked".into())));

        assert!(provider.handle(Mode::ReadWrite).await.is_ok());
        assert_eq!(engine.opens(), 2);
    }

    #[tokio::test]
    async fn missing_table_in_existing_database_fails() {
        let engine = MemoryEngine::new();
        table_provider(&engine)
            .handle(Mode::ReadOnly)
            .await
            .unwrap();

        let other = TableProvider::new(
            Arc::new(engine.clone()),
            &Config::new().db_name("db").table_name("other"),
        );
        assert!(matches!(
            other.handle(Mode::ReadOnly).await,
            Err(KvError::Store(StoreError::TableNotFound { .. }))
        ));
    }
}
