//! Requests and transaction completion handles.

use crate::error::{StoreError, StoreResult};
use crate::event::{Emitter, EventKind, EventTarget};
use parking_lot::Mutex;
use std::sync::Arc;

/// A one-shot asynchronous operation.
///
/// The engine keeps one clone and settles it with [`Request::succeed`] or
/// [`Request::fail`]; callers keep another clone and observe the outcome
/// through its [`Emitter`]. The result is stored on the request itself and
/// read once with [`EventTarget::outcome`].
pub struct Request<T> {
    inner: Arc<RequestInner<T>>,
}

struct RequestInner<T> {
    emitter: Emitter,
    result: Mutex<Option<StoreResult<T>>>,
}

impl<T> Request<T> {
    /// Creates a request that has not settled.
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(RequestInner {
                emitter: Emitter::new(),
                result: Mutex::new(None),
            }),
        }
    }

    /// Creates a request that has already succeeded with `value`.
    pub fn resolved(value: T) -> Self {
        let request = Self::pending();
        request.succeed(value);
        request
    }

    /// Creates a request that has already failed with `error`.
    pub fn rejected(error: StoreError) -> Self {
        let request = Self::pending();
        request.fail(error);
        request
    }

    /// Settles the request successfully. Ignored if already settled.
    pub fn succeed(&self, value: T) {
        self.settle(Ok(value), EventKind::Success);
    }

    /// Settles the request with an error. Ignored if already settled.
    pub fn fail(&self, error: StoreError) {
        self.settle(Err(error), EventKind::Error);
    }

    /// Returns true once the request has settled.
    pub fn is_done(&self) -> bool {
        self.inner.emitter.fired().is_some()
    }

    fn settle(&self, result: StoreResult<T>, kind: EventKind) {
        {
            let mut slot = self.inner.result.lock();
            if slot.is_some() || self.is_done() {
                return;
            }
            *slot = Some(result);
        }
        self.inner.emitter.fire(kind);
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("fired", &self.inner.emitter.fired())
            .finish()
    }
}

impl<T> EventTarget for Request<T> {
    type Output = T;
    const SUCCESS: EventKind = EventKind::Success;

    fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }

    fn outcome(&self, _kind: EventKind) -> StoreResult<T> {
        self.inner
            .result
            .lock()
            .take()
            .unwrap_or_else(|| Err(StoreError::request("request result already consumed")))
    }
}

/// Completion signal of a transaction.
///
/// Fires `Complete` on commit, `Abort` when the transaction is aborted and
/// `Error` when a failed request brought it down.
#[derive(Clone, Default)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

#[derive(Default)]
struct CompletionInner {
    emitter: Emitter,
    error: Mutex<Option<StoreError>>,
}

impl Completion {
    /// Creates a completion that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals a successful commit.
    pub fn complete(&self) -> bool {
        self.inner.emitter.fire(EventKind::Complete)
    }

    /// Signals an abort carrying `error`.
    pub fn abort(&self, error: StoreError) -> bool {
        self.fail(EventKind::Abort, error)
    }

    /// Signals a failure caused by `error`.
    pub fn error(&self, error: StoreError) -> bool {
        self.fail(EventKind::Error, error)
    }

    /// Returns true once the transaction has finished either way.
    pub fn is_finished(&self) -> bool {
        self.inner.emitter.fired().is_some()
    }

    fn fail(&self, kind: EventKind, error: StoreError) -> bool {
        if self.is_finished() {
            return false;
        }
        *self.inner.error.lock() = Some(error);
        self.inner.emitter.fire(kind)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("fired", &self.inner.emitter.fired())
            .finish()
    }
}

impl EventTarget for Completion {
    type Output = ();
    const SUCCESS: EventKind = EventKind::Complete;

    fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }

    fn outcome(&self, kind: EventKind) -> StoreResult<()> {
        if !kind.is_failure() {
            return Ok(());
        }
        Err(self
            .inner
            .error
            .lock()
            .clone()
            .unwrap_or_else(|| StoreError::aborted("unknown")))
    }
}
