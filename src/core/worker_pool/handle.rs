//! Result handle returned by `WorkerPool::run`.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use super::TaskId;
use crate::core::PoolError;

/// Handle to the outcome of a task submitted with `WorkerPool::run`.
///
/// The outcome can be taken once. Dropping the handle does not cancel the
/// task; its result is simply discarded.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: Receiver<Result<R, PoolError>>,
}

impl<R> TaskHandle<R> {
    pub(crate) const fn new(id: TaskId, rx: Receiver<Result<R, PoolError>>) -> Self {
        Self { id, rx }
    }

    /// Identifier of the task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the outcome if the task has finished, without blocking.
    ///
    /// `None` means the task is still queued or running. A task dropped by
    /// `shutdown_now` yields `Some(Err(PoolError::TaskAbandoned))`.
    ///
    /// The outcome is handed out once. After a `Some` has been returned here
    /// or by [`TaskHandle::wait_timeout`], the handle is spent and every
    /// later call reports `TaskAbandoned`; drop it instead of polling again.
    pub fn try_result(&self) -> Option<Result<R, PoolError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PoolError::TaskAbandoned)),
        }
    }

    /// Blocks until the task finishes or `timeout` elapses.
    ///
    /// Like [`TaskHandle::try_result`], a successful call spends the handle.
    ///
    /// # Errors
    ///
    /// - `PoolError::Timeout` if the task did not finish in time
    /// - `PoolError::TaskPanicked` if the closure panicked
    /// - `PoolError::TaskAbandoned` if the task was discarded before running
    pub fn wait_timeout(&self, timeout: Duration) -> Result<R, PoolError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(PoolError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::TaskAbandoned),
        }
    }

    /// Blocks until the task finishes.
    ///
    /// # Errors
    ///
    /// - `PoolError::TaskPanicked` if the closure panicked
    /// - `PoolError::TaskAbandoned` if the task was discarded before running
    pub fn wait(self) -> Result<R, PoolError> {
        self.rx.recv().unwrap_or(Err(PoolError::TaskAbandoned))
    }
}

#[cfg(feature = "tokio-runtime")]
impl<R: Send + 'static> TaskHandle<R> {
    /// Waits for the task from an async context.
    ///
    /// The blocking receive is moved onto tokio's blocking thread pool so the
    /// calling runtime is never stalled.
    ///
    /// # Errors
    ///
    /// Same as [`TaskHandle::wait`].
    pub async fn wait_async(self) -> Result<R, PoolError> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .unwrap_or_else(|e| Err(join_error_outcome(e)))
    }
}

/// A blocking wait that panicked is a panic; one cancelled by runtime
/// shutdown never delivered the outcome.
#[cfg(feature = "tokio-runtime")]
fn join_error_outcome(e: tokio::task::JoinError) -> PoolError {
    if e.is_panic() {
        PoolError::TaskPanicked(super::panic_message(e.into_panic().as_ref()))
    } else {
        PoolError::TaskAbandoned
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("ready", &!self.rx.is_empty())
            .finish()
    }
}
