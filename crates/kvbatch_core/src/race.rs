//! First-settled-wins combinator for read results.

use crate::batcher::Cycle;
use crate::error::{KvError, KvResult};
use tokio::sync::oneshot;

/// Resolves with whichever of `result` and `cycle` settles first.
///
/// The read's own result is polled first, so it wins when both are ready.
/// A failed cycle wins over a read that has not settled. If the responder
/// was dropped, the caller gets the cycle's error, or
/// [`KvError::Dropped`] when the cycle itself succeeded.
pub(crate) async fn first_settled<T>(
    mut result: oneshot::Receiver<KvResult<T>>,
    mut cycle: Cycle,
) -> KvResult<T> {
    tokio::select! {
        biased;
        settled = &mut result => match settled {
            Ok(value) => value,
            Err(_) => cycle.await.and(Err(KvError::Dropped)),
        },
        outcome = &mut cycle => match outcome {
            Ok(()) => result.await.unwrap_or(Err(KvError::Dropped)),
            Err(err) => Err(err),
        },
    }
}
