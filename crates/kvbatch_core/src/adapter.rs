//! Event-to-future adapter.
//!
//! Requests and transactions report completion through one-shot events.
//! [`settle`] turns any [`EventTarget`] into a future, and is the only
//! place in the crate where events are consumed directly.

use kvbatch_storage::{Emitter, EventKind, EventTarget, ListenerId, StoreError, StoreResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Listeners registered on one emitter, removed on drop.
///
/// Once the emitter fires it drops its listeners by itself; the guard
/// covers the case where the waiting future is dropped first.
pub struct Subscription<'a> {
    emitter: &'a Emitter,
    ids: Vec<ListenerId>,
}

impl<'a> Subscription<'a> {
    fn new(emitter: &'a Emitter) -> Self {
        Self {
            emitter,
            ids: Vec::with_capacity(3),
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.emitter.unlisten(id);
        }
    }
}

/// Waits for `target` to fire and returns its outcome.
///
/// Listens once each for the success kind, `Error` and `Abort`. A target
/// that has already fired resolves on the first poll, so
/// `settle(Request::resolved(v))` is a ready future.
///
/// # Errors
///
/// Returns the target's error when it fires `Error` or `Abort`.
pub async fn settle<E>(target: E) -> StoreResult<E::Output>
where
    E: EventTarget,
{
    let (tx, rx) = oneshot::channel::<EventKind>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let mut subscription = Subscription::new(target.emitter());
    for kind in [E::SUCCESS, EventKind::Error, EventKind::Abort] {
        let tx = Arc::clone(&tx);
        let id = subscription.emitter.listen(
            kind,
            Box::new(move |fired| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(fired);
                }
            }),
        );
        subscription.ids.push(id);
    }
    drop(tx);

    let fired = rx
        .await
        .map_err(|_| StoreError::request("event source dropped its listeners"))?;
    drop(subscription);
    target.outcome(fired)
}
