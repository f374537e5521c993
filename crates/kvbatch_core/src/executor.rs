//! Commit cycle executor.
//!
//! One run of [`run`] is one cycle: open a read-write transaction, drain
//! the provider's queue into it, commit, and report how the transaction
//! ended.

use crate::action::Action;
use crate::adapter::settle;
use crate::batcher::Batcher;
use crate::error::{KvError, KvResult};
use crate::provider::{Provider, ProviderId};
use futures::future::{try_join, try_join_all};
use kvbatch_storage::{Mode, Transaction};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Phase of a commit cycle, as reported in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Registered, executor not yet started.
    Idle,
    /// Waiting for the read-write transaction.
    Opening,
    /// Replaying queued actions into the transaction.
    Draining,
    /// Committed, waiting for the transaction to complete.
    Finalizing,
    /// Transaction committed.
    Done,
    /// Transaction could not be opened or did not commit.
    Failed,
}

impl CycleState {
    /// Returns true once the cycle has an outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Done | CycleState::Failed)
    }
}

/// The provider's queue, owned by one cycle until it is drained.
///
/// Dropping the guard before [`QueueGuard::drain`] (the cycle's task was
/// cancelled, or never polled) removes the registry entry, so the next
/// operation on the provider starts a fresh cycle.
struct QueueGuard {
    batcher: Arc<Batcher>,
    id: ProviderId,
    armed: bool,
}

impl QueueGuard {
    fn drain(&mut self) -> Vec<Action> {
        self.armed = false;
        self.batcher.drain(self.id)
    }
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        if self.armed {
            let dropped = self.batcher.drain(self.id).len();
            warn!(provider = %self.id, dropped, "commit cycle cancelled before draining");
        }
    }
}

/// Runs one commit cycle for `provider`.
///
/// The queue is taken only after the transaction is open, so actions
/// enqueued while opening are part of this cycle. Taking the queue also
/// deregisters the cycle; anything enqueued after that starts the next one.
/// The returned future owns the queue from the start: dropping it, polled or
/// not, releases the provider.
pub(crate) fn run(
    batcher: Arc<Batcher>,
    provider: Provider,
) -> impl Future<Output = KvResult<()>> + Send + 'static {
    let queue = QueueGuard {
        batcher,
        id: provider.id(),
        armed: true,
    };
    execute(queue, provider)
}

async fn execute(mut queue: QueueGuard, provider: Provider) -> KvResult<()> {
    let id = provider.id();
    trace!(provider = %id, state = ?CycleState::Opening, "opening transaction");
    let handle = match provider.handle(Mode::ReadWrite).await {
        Ok(handle) => handle,
        Err(err) => {
            let dropped = queue.drain().len();
            warn!(
                provider = %id,
                state = ?CycleState::Failed,
                dropped,
                error = %err,
                "commit cycle could not open a transaction"
            );
            return Err(err);
        }
    };

    let actions = queue.drain();
    let queued = actions.len();
    debug!(provider = %id, state = ?CycleState::Draining, actions = queued, "draining queue");

    let mut failure = None;
    let mut replayed = 0;
    for action in actions {
        if !handle.is_active() {
            break;
        }
        let name = action.name();
        if let Err(err) = replay(handle.as_ref(), action).await {
            debug!(provider = %id, action = name, error = %err, "action failed, aborting");
            handle.abort(&err.to_string());
            failure = Some(err);
            break;
        }
        replayed += 1;
    }
    if replayed < queued {
        debug!(provider = %id, skipped = queued - replayed, "replay stopped early");
    }

    trace!(provider = %id, state = ?CycleState::Finalizing, "committing");
    handle.commit();
    let completed = settle(handle.completion()).await.map_err(KvError::from);

    let outcome = match failure {
        Some(err) => Err(err),
        None => completed,
    };
    match &outcome {
        Ok(()) => debug!(provider = %id, state = ?CycleState::Done, actions = queued, "cycle committed"),
        Err(err) => warn!(provider = %id, state = ?CycleState::Failed, error = %err, "commit cycle failed"),
    }
    outcome
}

/// Issues one action against `tx`.
///
/// Reads answer their own responder and always return `Ok`. Writes return
/// the error that stopped them.
async fn replay(tx: &dyn Transaction, action: Action) -> KvResult<()> {
    match action {
        Action::Get { key, respond } => {
            let result = settle(tx.get(&key)).await.map_err(KvError::from);
            let _ = respond.send(result);
        }
        Action::GetMany { keys, respond } => {
            let result = try_join_all(keys.iter().map(|key| settle(tx.get(key))))
                .await
                .map_err(KvError::from);
            let _ = respond.send(result);
        }
        Action::Keys { respond } => {
            let result = settle(tx.get_all_keys()).await.map_err(KvError::from);
            let _ = respond.send(result);
        }
        Action::Values { respond } => {
            let result = settle(tx.get_all()).await.map_err(KvError::from);
            let _ = respond.send(result);
        }
        Action::Entries { respond } => {
            let result = try_join(settle(tx.get_all_keys()), settle(tx.get_all()))
                .await
                .map(|(keys, values)| keys.into_iter().zip(values).collect())
                .map_err(KvError::from);
            let _ = respond.send(result);
        }
        Action::Set { key, value } => {
            settle(tx.put(value, key)).await?;
        }
        Action::SetMany { entries } => {
            try_join_all(
                entries
                    .into_iter()
                    .map(|(key, value)| settle(tx.put(value, key))),
            )
            .await?;
        }
        Action::Update { key, transform } => {
            let current = settle(tx.get(&key)).await?;
            let next = transform(current)?;
            settle(tx.put(next, key)).await?;
        }
        Action::Delete { key } => {
            settle(tx.delete(&key)).await?;
        }
        Action::DeleteMany { keys } => {
            try_join_all(keys.iter().map(|key| settle(tx.delete(key)))).await?;
        }
        Action::Clear => {
            settle(tx.clear()).await?;
        }
    }
    Ok(())
}
