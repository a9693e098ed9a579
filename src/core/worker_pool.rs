//! Elastic worker pool backed by dedicated OS threads.
//!
//! The pool keeps `core_threads` workers alive from `start` until shutdown and
//! grows on demand up to `max_threads` with *overflow* workers that retire
//! after sitting idle for `idle_timeout`.
//!
//! # Key Features
//!
//! - **FIFO queue**: tasks run in submission order, one worker per task
//! - **Elastic**: overflow workers are spawned only when no worker is idle
//! - **Result handles**: `run` returns a [`TaskHandle`] for the closure's value
//! - **Two shutdown modes**: drain the backlog, or discard it
//! - **No polling**: workers park on a `parking_lot::Condvar`
//!
//! # Example
//!
//! ```
//! use prometheus_timer_pool::config::PoolConfig;
//! use prometheus_timer_pool::core::WorkerPool;
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(
//!     PoolConfig::new()
//!         .with_core_threads(2)
//!         .with_max_threads(4)
//!         .with_idle_timeout(Duration::from_millis(200)),
//! );
//! pool.start().unwrap();
//!
//! let handle = pool.run(|| 2 + 2).unwrap();
//! assert_eq!(handle.wait().unwrap(), 4);
//!
//! pool.shutdown();
//! assert!(pool.await_termination(Duration::from_secs(5)));
//! ```

mod handle;
mod native;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub use handle::TaskHandle;
pub use native::WorkerPool;

/// Identifier assigned to every submitted task.
pub type TaskId = u64;

/// Identifier assigned to every worker thread. Never reused.
pub type WorkerId = u64;

/// Whether a worker is permanent or created on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Started by `start`, lives until shutdown.
    Core,
    /// Spawned under load, retires after the idle timeout.
    Overflow,
}

impl WorkerKind {
    /// Short label used in thread names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Overflow => "overflow",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Thread spawned, loop not entered yet.
    Created = 0,
    /// Parked, waiting for a task.
    Waiting = 1,
    /// Executing a task.
    Running = 2,
    /// Left its loop.
    Stopped = 3,
}

impl WorkerState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Waiting,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Worker identifier.
    pub id: WorkerId,
    /// Core or overflow.
    pub kind: WorkerKind,
    /// Lifecycle state at the time of the snapshot.
    pub state: WorkerState,
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads.
    pub total_workers: usize,
    /// Workers parked waiting for work.
    pub waiting_workers: usize,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks accepted by `run`/`execute`.
    pub submitted_tasks: u64,
    /// Tasks that finished, successfully or by panicking.
    pub completed_tasks: u64,
    /// Tasks that panicked.
    pub failed_tasks: u64,
    /// Overflow workers spawned since start.
    pub overflow_spawned: u64,
    /// Worker threads the OS refused to create.
    pub spawn_failures: u64,
    /// Submissions that found the queue above `max_queue_size`.
    pub backpressure_events: u64,
    /// Queued tasks dropped by `shutdown_now`.
    pub abandoned_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub live_workers: AtomicUsize,
    pub waiting_workers: AtomicUsize,
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub overflow_spawned: AtomicU64,
    pub spawn_failures: AtomicU64,
    pub backpressure_events: AtomicU64,
    pub abandoned_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            total_workers: self.live_workers.load(Ordering::Acquire),
            waiting_workers: self.waiting_workers.load(Ordering::Acquire),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Acquire),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Acquire),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            overflow_spawned: self.overflow_spawned.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            abandoned_tasks: self.abandoned_tasks.load(Ordering::Relaxed),
        }
    }
}

/// How a queued job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    Completed,
    Panicked,
}

/// Boxed job as stored in the queue.
pub(crate) type Job = Box<dyn FnOnce() -> TaskOutcome + Send + 'static>;

/// A task waiting in the pool's FIFO queue.
pub(crate) struct QueuedTask {
    /// Task identifier, used in logs.
    pub id: TaskId,
    /// The wrapped closure.
    pub job: Job,
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.total_workers, 0);
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.completed_tasks, 0);
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_tasks.fetch_add(10, Ordering::Relaxed);
        counters.completed_tasks.fetch_add(5, Ordering::Relaxed);
        counters.live_workers.fetch_add(3, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.total_workers, 3);
        assert_eq!(stats.submitted_tasks, 10);
        assert_eq!(stats.completed_tasks, 5);
    }

    #[test]
    fn test_worker_state_from_u8() {
        assert_eq!(WorkerState::from_u8(WorkerState::Waiting as u8), WorkerState::Waiting);
        assert_eq!(WorkerState::from_u8(WorkerState::Running as u8), WorkerState::Running);
        assert_eq!(WorkerState::from_u8(42), WorkerState::Stopped);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
