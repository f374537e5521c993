//! One-shot completion events.
//!
//! Every [`crate::Request`] and every transaction owns an [`Emitter`]. An
//! emitter fires at most once. When it fires, listeners registered for the
//! fired kind are invoked and every other listener is dropped, so no
//! subscription outlives the event. Listeners added after the emitter has
//! fired are invoked immediately if their kind matches.

use crate::error::StoreResult;
use parking_lot::Mutex;

/// Kind of completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A request produced its result.
    Success,
    /// A transaction committed.
    Complete,
    /// A request or transaction failed.
    Error,
    /// A transaction was aborted.
    Abort,
}

impl EventKind {
    /// Returns true for the kinds that report failure.
    pub fn is_failure(self) -> bool {
        matches!(self, EventKind::Error | EventKind::Abort)
    }
}

/// Callback invoked when an event fires.
pub type Listener = Box<dyn FnOnce(EventKind) + Send>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of listeners for a one-shot event source.
#[derive(Default)]
pub struct Emitter {
    state: Mutex<EmitterState>,
}

#[derive(Default)]
struct EmitterState {
    fired: Option<EventKind>,
    next_id: u64,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
}

impl Emitter {
    /// Creates an emitter that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the kind that fired, if any.
    pub fn fired(&self) -> Option<EventKind> {
        self.state.lock().fired
    }

    /// Registers `listener` for `kind`.
    pub fn listen(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_id);
        state.next_id += 1;

        match state.fired {
            Some(fired) => {
                drop(state);
                if fired == kind {
                    listener(fired);
                }
            }
            None => state.listeners.push((id, kind, listener)),
        }
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _, _)| *lid != id);
        state.listeners.len() != before
    }

    /// Number of listeners still registered.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Fires `kind`. Returns false if the emitter had already fired.
    ///
    /// Listeners run after the internal lock is released, so they may
    /// freely call back into the emitter.
    pub fn fire(&self, kind: EventKind) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            if state.fired.is_some() {
                return false;
            }
            state.fired = Some(kind);
            std::mem::take(&mut state.listeners)
        };

        for (_, listens_for, listener) in listeners {
            if listens_for == kind {
                listener(kind);
            }
        }
        true
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Emitter")
            .field("fired", &state.fired)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// A one-shot operation that reports its outcome through events.
pub trait EventTarget {
    /// Value produced on success.
    type Output;

    /// The kind fired on success (`Success` for requests, `Complete` for
    /// transactions).
    const SUCCESS: EventKind;

    /// The emitter carrying this target's completion event.
    fn emitter(&self) -> &Emitter;

    /// Reads the outcome after `kind` has fired.
    ///
    /// # Errors
    ///
    /// Returns the operation's error when `kind` is a failure kind, or
    /// when the result has already been taken.
    fn outcome(&self, kind: EventKind) -> StoreResult<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Listener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let make = {
            let hits = Arc::clone(&hits);
            move || -> Listener {
                let hits = Arc::clone(&hits);
                Box::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            }
        };
        (hits, make)
    }

    #[test]
    fn fire_invokes_matching_listeners_only() {
        let emitter = Emitter::new();
        let (hits, make) = counter();
        emitter.listen(EventKind::Success, make());
        emitter.listen(EventKind::Error, make());

        assert!(emitter.fire(EventKind::Success));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn fires_at_most_once() {
        let emitter = Emitter::new();
        let (hits, make) = counter();
        emitter.listen(EventKind::Error, make());

        assert!(emitter.fire(EventKind::Success));
        assert!(!emitter.fire(EventKind::Error));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.fired(), Some(EventKind::Success));
    }

    #[test]
    fn late_listener_sees_latched_event() {
        let emitter = Emitter::new();
        emitter.fire(EventKind::Complete);

        let (hits, make) = counter();
        emitter.listen(EventKind::Complete, make());
        emitter.listen(EventKind::Abort, make());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn unlisten_removes_listener() {
        let emitter = Emitter::new();
        let (hits, make) = counter();
        let id = emitter.listen(EventKind::Success, make());

        assert!(emitter.unlisten(id));
        assert!(!emitter.unlisten(id));
        emitter.fire(EventKind::Success);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_reenter_emitter() {
        let emitter = Arc::new(Emitter::new());
        let inner = Arc::clone(&emitter);
        emitter.listen(
            EventKind::Success,
            Box::new(move |_| {
                assert_eq!(inner.fired(), Some(EventKind::Success));
                assert_eq!(inner.listener_count(), 0);
            }),
        );
        emitter.fire(EventKind::Success);
    }

    #[test]
    fn failure_kinds() {
        assert!(EventKind::Error.is_failure());
        assert!(EventKind::Abort.is_failure());
        assert!(!EventKind::Success.is_failure());
        assert!(!EventKind::Complete.is_failure());
    }
}
