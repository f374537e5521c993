//! Action queues and the transaction coalescer.
//!
//! The batcher keeps, per provider identity, the actions waiting for a
//! transaction and the cycle that will run them. An entry exists only
//! while there is pending work for its provider: it is created by the
//! first enqueue and removed when a cycle drains it.
//!
//! ## Coalescing
//!
//! [`Batcher::cycle`] registers a new cycle synchronously, before the
//! executor task gets a chance to run. Every enqueue made before the
//! caller next yields therefore lands in the same queue and is drained by
//! the same transaction. On a current-thread runtime this is exact; on a
//! multi-thread runtime the executor may start early and batches get
//! smaller, but never reorder.

use crate::action::{Action, Responder};
use crate::error::{KvError, KvResult};
use crate::executor::{self, CycleState};
use crate::provider::{Provider, ProviderId};
use crate::race::first_settled;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The shared future of one commit cycle.
///
/// Resolves to `Ok(())` when the transaction commits and to the
/// transaction's error otherwise.
pub type Cycle = Shared<BoxFuture<'static, KvResult<()>>>;

#[derive(Default)]
struct PendingBatch {
    actions: Vec<Action>,
    cycle: Option<Cycle>,
}

/// Registry of per-provider queues and active cycles.
#[derive(Default)]
pub struct Batcher {
    pending: Mutex<HashMap<ProviderId, PendingBatch>>,
}

impl Batcher {
    /// Creates an empty batcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide batcher used by stores that don't bring their own.
    pub fn global() -> Arc<Batcher> {
        static GLOBAL: OnceLock<Arc<Batcher>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Batcher::new())))
    }

    /// Appends `action` to the queue of `provider`.
    pub fn enqueue(&self, provider: &Provider, action: Action) {
        self.pending
            .lock()
            .entry(provider.id())
            .or_default()
            .actions
            .push(action);
    }

    /// Enqueues a write and returns the cycle that will commit it.
    pub fn enqueue_write(self: &Arc<Self>, provider: &Provider, action: Action) -> Cycle {
        self.enqueue(provider, action);
        self.cycle(provider)
    }

    /// Enqueues a read built around a fresh responder.
    ///
    /// The returned future resolves with the read's own result, or with the
    /// cycle's error if the cycle fails before the read is serviced.
    pub fn enqueue_read<T, F>(self: &Arc<Self>, provider: &Provider, build: F) -> BoxFuture<'static, KvResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(Responder<T>) -> Action,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(provider, build(tx));
        let cycle = self.cycle(provider);
        first_settled(rx, cycle).boxed()
    }

    /// Returns the active cycle of `provider`, starting one if needed.
    ///
    /// Starting a cycle spawns the executor on the current tokio runtime.
    /// Without a runtime the queued actions are discarded and the returned
    /// cycle fails with [`KvError::Runtime`].
    pub fn cycle(self: &Arc<Self>, provider: &Provider) -> Cycle {
        let id = provider.id();
        let (done, outcome) = oneshot::channel();
        let (runtime, cycle) = {
            let mut pending = self.pending.lock();
            if let Some(cycle) = pending.get(&id).and_then(|batch| batch.cycle.clone()) {
                return cycle;
            }

            let runtime = match Handle::try_current() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let dropped = pending.remove(&id).map_or(0, |batch| batch.actions.len());
                    warn!(provider = %id, dropped, "no runtime to run commit cycle");
                    return future::ready(Err(KvError::runtime(err.to_string())))
                        .boxed()
                        .shared();
                }
            };

            let batch = pending.entry(id).or_default();
            debug!(
                provider = %id,
                state = ?CycleState::Idle,
                queued = batch.actions.len(),
                "starting commit cycle"
            );
            let cycle = async move {
                outcome.await.unwrap_or_else(|_| {
                    Err(KvError::runtime("commit cycle was cancelled before it finished"))
                })
            }
            .boxed()
            .shared();
            batch.cycle = Some(cycle.clone());
            (runtime, cycle)
        };

        // A runtime that is shutting down drops the task right here, which
        // drains the registry entry; the lock must already be released.
        let task = executor::run(Arc::clone(self), provider.clone());
        runtime.spawn(async move {
            let _ = done.send(task.await);
        });
        cycle
    }

    /// Takes the queue of `id` and deregisters its cycle.
    pub(crate) fn drain(&self, id: ProviderId) -> Vec<Action> {
        self.pending
            .lock()
            .remove(&id)
            .map(|batch| batch.actions)
            .unwrap_or_default()
    }

    /// Number of actions waiting for the next cycle of `provider`.
    pub fn pending_actions(&self, provider: &Provider) -> usize {
        self.pending
            .lock()
            .get(&provider.id())
            .map_or(0, |batch| batch.actions.len())
    }

    /// Returns true while a cycle is registered for `provider`.
    pub fn has_cycle(&self, provider: &Provider) -> bool {
        self.pending
            .lock()
            .get(&provider.id())
            .is_some_and(|batch| batch.cycle.is_some())
    }

    /// Number of providers with pending work.
    pub fn active_providers(&self) -> usize {
        self.pending.lock().len()
    }
}
