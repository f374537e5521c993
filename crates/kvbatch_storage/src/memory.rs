//! In-memory storage engine.

use crate::backend::{BoxFuture, Connection, Engine, Mode, Schema, Transaction, UpgradeFn};
use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::request::{Completion, Request};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

type Rows = BTreeMap<Key, Vec<u8>>;

/// Faults injected into a [`MemoryEngine`].
///
/// Used by tests to drive the failure paths of code built on the engine.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail the next `open` with this message.
    pub fail_next_open: Option<String>,
    /// Fail every request that touches this key.
    pub failing_key: Option<Key>,
    /// Abort the next commit with this reason.
    pub abort_next_commit: Option<String>,
}

/// An in-memory storage engine.
///
/// Databases live as long as the engine. Clones share the same databases,
/// so a clone can be handed to a store while the test keeps another one
/// to inspect state, inject faults, and read counters.
///
/// # Semantics
///
/// - Mutations are staged in the transaction and applied on commit
/// - Read-write transactions on one table are serialized, first come
///   first served
/// - A failed mutation fails the transaction with `Error`
/// - A failed lookup fails only its own request
/// - Dropping an unfinished transaction aborts it
///
/// # Example
///
/// ```rust
/// use kvbatch_storage::MemoryEngine;
///
/// let engine = MemoryEngine::new();
/// engine.abort_next_commit("simulated crash");
/// assert_eq!(engine.transactions_started(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

#[derive(Default)]
struct EngineInner {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
    faults: Mutex<FaultPlan>,
    opens: AtomicU64,
    upgrades: AtomicU64,
    transactions: AtomicU64,
    commits: AtomicU64,
}

struct MemoryDatabase {
    tables: HashMap<String, Arc<MemoryTable>>,
}

#[derive(Default)]
struct MemoryTable {
    rows: RwLock<Rows>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Default)]
struct MemorySchema {
    tables: Vec<String>,
}

impl Schema for MemorySchema {
    fn create_table(&mut self, name: &str) -> StoreResult<()> {
        if self.has_table(name) {
            return Err(StoreError::TableExists {
                name: name.to_string(),
            });
        }
        self.tables.push(name.to_string());
        Ok(())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name)
    }
}

impl MemoryEngine {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current fault plan.
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.inner.faults.lock() = plan;
    }

    /// Fails the next `open` call.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.inner.faults.lock().fail_next_open = Some(message.into());
    }

    /// Fails every request that touches `key`.
    pub fn fail_requests_on(&self, key: impl Into<Key>) {
        self.inner.faults.lock().failing_key = Some(key.into());
    }

    /// Aborts the next commit.
    pub fn abort_next_commit(&self, reason: impl Into<String>) {
        self.inner.faults.lock().abort_next_commit = Some(reason.into());
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.set_faults(FaultPlan::default());
    }

    /// Number of `open` calls.
    pub fn opens(&self) -> u64 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Number of databases bootstrapped.
    pub fn upgrades(&self) -> u64 {
        self.inner.upgrades.load(Ordering::SeqCst)
    }

    /// Number of transactions started, in any mode.
    pub fn transactions_started(&self) -> u64 {
        self.inner.transactions.load(Ordering::SeqCst)
    }

    /// Number of successful commits.
    pub fn commits(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Committed contents of a table, in key order.
    pub fn snapshot(&self, db: &str, table: &str) -> Option<Vec<(Key, Vec<u8>)>> {
        let databases = self.inner.databases.lock();
        let table = databases.get(db)?.tables.get(table)?;
        let rows = table.rows.read();
        Some(rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Deletes a database. Open connections keep their tables alive.
    pub fn delete_database(&self, name: &str) -> bool {
        self.inner.databases.lock().remove(name).is_some()
    }
}

impl Engine for MemoryEngine {
    fn open(&self, name: &str, upgrade: UpgradeFn) -> Request<Arc<dyn Connection>> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.inner.faults.lock().fail_next_open.take() {
            return Request::rejected(StoreError::Open(message));
        }

        let mut databases = self.inner.databases.lock();
        let db = match databases.get(name) {
            Some(db) => Arc::clone(db),
            None => {
                let mut schema = MemorySchema::default();
                if let Err(error) = upgrade(&mut schema) {
                    return Request::rejected(error);
                }
                debug!(db = name, tables = ?schema.tables, "created database");
                self.inner.upgrades.fetch_add(1, Ordering::SeqCst);
                let db = Arc::new(MemoryDatabase {
                    tables: schema
                        .tables
                        .into_iter()
                        .map(|t| (t, Arc::new(MemoryTable::default())))
                        .collect(),
                });
                databases.insert(name.to_string(), Arc::clone(&db));
                db
            }
        };

        let connection: Arc<dyn Connection> = Arc::new(MemoryConnection {
            engine: Arc::clone(&self.inner),
            name: name.to_string(),
            db,
            closed: AtomicBool::new(false),
        });
        Request::resolved(connection)
    }
}

struct MemoryConnection {
    engine: Arc<EngineInner>,
    name: String,
    db: Arc<MemoryDatabase>,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction(
        &self,
        table: &str,
        mode: Mode,
    ) -> BoxFuture<'static, StoreResult<Box<dyn Transaction>>> {
        let engine = Arc::clone(&self.engine);
        let found = if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            self.db
                .tables
                .get(table)
                .cloned()
                .ok_or_else(|| StoreError::TableNotFound {
                    name: table.to_string(),
                })
        };

        Box::pin(async move {
            let table = found?;
            let writer = match mode {
                Mode::ReadWrite => Some(Arc::clone(&table.writer).lock_owned().await),
                Mode::ReadOnly => None,
            };
            engine.transactions.fetch_add(1, Ordering::SeqCst);
            let tx: Box<dyn Transaction> = Box::new(MemoryTransaction {
                engine,
                table,
                mode,
                state: Mutex::new(TxState {
                    active: true,
                    cleared: false,
                    staged: BTreeMap::new(),
                    writer,
                }),
                completion: Completion::new(),
            });
            Ok(tx)
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryTransaction {
    engine: Arc<EngineInner>,
    table: Arc<MemoryTable>,
    mode: Mode,
    state: Mutex<TxState>,
    completion: Completion,
}

struct TxState {
    active: bool,
    cleared: bool,
    /// `None` marks a staged delete.
    staged: BTreeMap<Key, Option<Vec<u8>>>,
    writer: Option<OwnedMutexGuard<()>>,
}

impl TxState {
    fn read(&self, rows: &Rows, key: &Key) -> Option<Vec<u8>> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None if self.cleared => None,
            None => rows.get(key).cloned(),
        }
    }

    fn merged<'a>(&'a self, rows: &'a Rows) -> BTreeMap<&'a Key, &'a [u8]> {
        let mut view: BTreeMap<&Key, &[u8]> = if self.cleared {
            BTreeMap::new()
        } else {
            rows.iter().map(|(k, v)| (k, v.as_slice())).collect()
        };
        for (key, value) in &self.staged {
            match value {
                Some(value) => {
                    view.insert(key, value.as_slice());
                }
                None => {
                    view.remove(key);
                }
            }
        }
        view
    }

    fn finish(&mut self) {
        self.active = false;
        self.cleared = false;
        self.staged.clear();
        self.writer = None;
    }
}

impl MemoryTransaction {
    fn faulty(&self, key: &Key) -> bool {
        self.engine.faults.lock().failing_key.as_ref() == Some(key)
    }

    fn lookup<T>(&self, key: Option<&Key>, read: impl FnOnce(&TxState, &Rows) -> T) -> Request<T> {
        let state = self.state.lock();
        if !state.active {
            return Request::rejected(StoreError::TransactionInactive);
        }
        if let Some(key) = key.filter(|k| self.faulty(k)) {
            return Request::rejected(StoreError::request(format!("lookup of {key} failed")));
        }
        let rows = self.table.rows.read();
        Request::resolved(read(&state, &rows))
    }

    fn mutate<T>(&self, key: Option<&Key>, write: impl FnOnce(&mut TxState) -> T) -> Request<T> {
        let mut state = self.state.lock();
        if !state.active {
            return Request::rejected(StoreError::TransactionInactive);
        }

        let failure = match key {
            _ if self.mode == Mode::ReadOnly => Some(StoreError::ReadOnly),
            Some(key) if self.faulty(key) => {
                Some(StoreError::request(format!("write of {key} failed")))
            }
            _ => None,
        };
        match failure {
            Some(error) => {
                state.finish();
                drop(state);
                let request = Request::rejected(error.clone());
                self.completion.error(error);
                request
            }
            None => Request::resolved(write(&mut state)),
        }
    }
}

impl Transaction for MemoryTransaction {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn is_active(&self) -> bool {
        self.state.lock().active
    }

    fn get(&self, key: &Key) -> Request<Option<Vec<u8>>> {
        self.lookup(Some(key), |state, rows| state.read(rows, key))
    }

    fn get_all_keys(&self) -> Request<Vec<Key>> {
        self.lookup(None, |state, rows| {
            state.merged(rows).into_keys().cloned().collect()
        })
    }

    fn get_all(&self) -> Request<Vec<Vec<u8>>> {
        self.lookup(None, |state, rows| {
            state.merged(rows).into_values().map(<[u8]>::to_vec).collect()
        })
    }

    fn put(&self, value: Vec<u8>, key: Key) -> Request<Key> {
        let target = key.clone();
        self.mutate(Some(&target), move |state| {
            state.staged.insert(key.clone(), Some(value));
            key
        })
    }

    fn delete(&self, key: &Key) -> Request<()> {
        self.mutate(Some(key), |state| {
            state.staged.insert(key.clone(), None);
        })
    }

    fn clear(&self) -> Request<()> {
        self.mutate(None, |state| {
            state.staged.clear();
            state.cleared = true;
        })
    }

    fn commit(&self) {
        let mut state = self.state.lock();
        if !state.active {
            return;
        }

        if let Some(reason) = self.engine.faults.lock().abort_next_commit.take() {
            state.finish();
            drop(state);
            debug!(%reason, "commit refused");
            self.completion.abort(StoreError::aborted(reason));
            return;
        }

        {
            let mut rows = self.table.rows.write();
            if state.cleared {
                rows.clear();
            }
            for (key, value) in std::mem::take(&mut state.staged) {
                match value {
                    Some(value) => {
                        rows.insert(key, value);
                    }
                    None => {
                        rows.remove(&key);
                    }
                }
            }
        }
        state.finish();
        drop(state);

        self.engine.commits.fetch_add(1, Ordering::SeqCst);
        self.completion.complete();
    }

    fn abort(&self, reason: &str) {
        let mut state = self.state.lock();
        if !state.active {
            return;
        }
        state.finish();
        drop(state);
        self.completion.abort(StoreError::aborted(reason));
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.abort("transaction dropped before commit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventTarget};
    use futures::FutureExt;
    use proptest::prelude::*;

    fn create_table(table: &'static str) -> UpgradeFn {
        Box::new(move |schema: &mut dyn Schema| schema.create_table(table))
    }

    fn connect(engine: &MemoryEngine, db: &str) -> Arc<dyn Connection> {
        engine
            .open(db, create_table("kv"))
            .outcome(EventKind::Success)
            .unwrap()
    }

    fn value<T>(request: Request<T>) -> StoreResult<T> {
        let kind = request.emitter().fired().expect("request settled");
        request.outcome(kind)
    }

    async fn begin(conn: &Arc<dyn Connection>, mode: Mode) -> Box<dyn Transaction> {
        conn.transaction("kv", mode).await.unwrap()
    }

    #[test]
    fn open_bootstraps_once() {
        let engine = MemoryEngine::new();
        let first = connect(&engine, "db");
        let _second = connect(&engine, "db");

        assert_eq!(first.name(), "db");
        assert_eq!(engine.opens(), 2);
        assert_eq!(engine.upgrades(), 1);
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));
    }

    #[test]
    fn failed_upgrade_does_not_create_database() {
        let engine = MemoryEngine::new();
        let request = engine.open(
            "db",
            Box::new(|schema: &mut dyn Schema| {
                schema.create_table("kv")?;
                schema.create_table("kv")
            }),
        );
        assert!(matches!(value(request), Err(StoreError::TableExists { .. })));
        assert_eq!(engine.snapshot("db", "kv"), None);

        connect(&engine, "db");
        assert_eq!(engine.upgrades(), 1);
    }

    #[test]
    fn fail_next_open_is_consumed() {
        let engine = MemoryEngine::new();
        engine.fail_next_open("disk gone");
        let request = engine.open("db", create_table("kv"));
        assert_eq!(value(request).err(), Some(StoreError::Open("disk gone".into())));
        connect(&engine, "db");
    }

    #[tokio::test]
    async fn commit_applies_staged_writes() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;

        value(tx.put(b"1".to_vec(), Key::from("a"))).unwrap();
        value(tx.put(b"2".to_vec(), Key::from("b"))).unwrap();
        value(tx.delete(&Key::from("b"))).unwrap();
        assert_eq!(value(tx.get(&Key::from("a"))).unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));

        tx.commit();
        assert!(!tx.is_active());
        assert_eq!(tx.completion().emitter().fired(), Some(EventKind::Complete));
        assert_eq!(
            engine.snapshot("db", "kv"),
            Some(vec![(Key::from("a"), b"1".to_vec())])
        );
        assert_eq!(engine.commits(), 1);
    }

    #[tokio::test]
    async fn abort_discards_writes() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.put(b"1".to_vec(), Key::from("a"))).unwrap();
        tx.abort("changed my mind");

        let completion = tx.completion();
        assert_eq!(completion.emitter().fired(), Some(EventKind::Abort));
        assert_eq!(
            completion.outcome(EventKind::Abort).unwrap_err(),
            StoreError::aborted("changed my mind")
        );
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));
        assert_eq!(
            value(tx.get(&Key::from("a"))).unwrap_err(),
            StoreError::TransactionInactive
        );
    }

    #[tokio::test]
    async fn dropping_unfinished_transaction_aborts() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        let completion = tx.completion();
        value(tx.put(b"1".to_vec(), Key::from("a"))).unwrap();
        drop(tx);

        assert_eq!(completion.emitter().fired(), Some(EventKind::Abort));
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn clear_hides_committed_rows() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.put(b"1".to_vec(), Key::from("a"))).unwrap();
        tx.commit();

        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.clear()).unwrap();
        value(tx.put(b"2".to_vec(), Key::from("b"))).unwrap();
        assert_eq!(value(tx.get(&Key::from("a"))).unwrap(), None);
        assert_eq!(value(tx.get_all_keys()).unwrap(), vec![Key::from("b")]);
        tx.commit();

        assert_eq!(
            engine.snapshot("db", "kv"),
            Some(vec![(Key::from("b"), b"2".to_vec())])
        );
    }

    #[tokio::test]
    async fn enumerations_follow_key_order() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.put(b"t".to_vec(), Key::from("t"))).unwrap();
        value(tx.put(b"i".to_vec(), Key::from(3))).unwrap();

        assert_eq!(
            value(tx.get_all_keys()).unwrap(),
            vec![Key::from(3), Key::from("t")]
        );
        assert_eq!(
            value(tx.get_all()).unwrap(),
            vec![b"i".to_vec(), b"t".to_vec()]
        );
    }

    #[tokio::test]
    async fn read_only_rejects_mutation() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadOnly).await;
        assert_eq!(tx.mode(), Mode::ReadOnly);

        let result = value(tx.put(b"1".to_vec(), Key::from("a")));
        assert_eq!(result.unwrap_err(), StoreError::ReadOnly);
        assert_eq!(tx.completion().emitter().fired(), Some(EventKind::Error));
    }

    #[tokio::test]
    async fn failing_lookup_keeps_transaction_alive() {
        let engine = MemoryEngine::new();
        engine.fail_requests_on("bad");
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;

        assert!(value(tx.get(&Key::from("bad"))).is_err());
        assert!(tx.is_active());
        value(tx.put(b"1".to_vec(), Key::from("ok"))).unwrap();
        tx.commit();
        assert_eq!(engine.commits(), 1);
    }

    #[tokio::test]
    async fn failing_mutation_fails_transaction() {
        let engine = MemoryEngine::new();
        engine.fail_requests_on("bad");
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.put(b"1".to_vec(), Key::from("ok"))).unwrap();

        let error = value(tx.put(b"2".to_vec(), Key::from("bad"))).unwrap_err();
        assert!(!tx.is_active());
        let completion = tx.completion();
        assert_eq!(completion.emitter().fired(), Some(EventKind::Error));
        assert_eq!(completion.outcome(EventKind::Error).unwrap_err(), error);
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn abort_next_commit_rolls_back() {
        let engine = MemoryEngine::new();
        engine.abort_next_commit("power loss");
        let conn = connect(&engine, "db");
        let tx = begin(&conn, Mode::ReadWrite).await;
        value(tx.put(b"1".to_vec(), Key::from("a"))).unwrap();
        tx.commit();

        assert_eq!(tx.completion().emitter().fired(), Some(EventKind::Abort));
        assert_eq!(engine.snapshot("db", "kv"), Some(Vec::new()));
        assert_eq!(engine.commits(), 0);
    }

    #[tokio::test]
    async fn write_transactions_are_serialized() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        let first = begin(&conn, Mode::ReadWrite).await;

        let mut second = conn.transaction("kv", Mode::ReadWrite);
        assert!((&mut second).now_or_never().is_none());

        let reader = begin(&conn, Mode::ReadOnly).await;
        assert!(reader.is_active());

        value(first.put(b"1".to_vec(), Key::from("a"))).unwrap();
        first.commit();

        let second = second.await.unwrap();
        assert_eq!(value(second.get(&Key::from("a"))).unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.transactions_started(), 3);
    }

    #[tokio::test]
    async fn missing_table_and_closed_connection() {
        let engine = MemoryEngine::new();
        let conn = connect(&engine, "db");
        assert!(matches!(
            conn.transaction("nope", Mode::ReadOnly).await,
            Err(StoreError::TableNotFound { .. })
        ));

        conn.close();
        assert!(matches!(
            conn.transaction("kv", Mode::ReadOnly).await,
            Err(StoreError::Closed)
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u8),
        Delete(u8),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
            (0u8..6).prop_map(Op::Delete),
            Just(Op::Clear),
        ]
    }

    proptest! {
        #[test]
        fn committed_state_matches_model(
            before in proptest::collection::vec(op(), 0..20),
            during in proptest::collection::vec(op(), 0..20),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let engine = MemoryEngine::new();
                let conn = connect(&engine, "db");
                let mut model: BTreeMap<Key, Vec<u8>> = BTreeMap::new();

                for batch in [&before, &during] {
                    let tx = begin(&conn, Mode::ReadWrite).await;
                    for op in batch {
                        match op {
                            Op::Put(k, v) => {
                                value(tx.put(vec![*v], Key::from(i64::from(*k)))).unwrap();
                                model.insert(Key::from(i64::from(*k)), vec![*v]);
                            }
                            Op::Delete(k) => {
                                value(tx.delete(&Key::from(i64::from(*k)))).unwrap();
                                model.remove(&Key::from(i64::from(*k)));
                            }
                            Op::Clear => {
                                value(tx.clear()).unwrap();
                                model.clear();
                            }
                        }
                    }
                    let staged_keys: Vec<Key> = model.keys().cloned().collect();
                    assert_eq!(value(tx.get_all_keys()).unwrap(), staged_keys);
                    tx.commit();
                }

                let expected: Vec<(Key, Vec<u8>)> = model.into_iter().collect();
                assert_eq!(engine.snapshot("db", "kv").unwrap(), expected);
            });
        }
    }
}
