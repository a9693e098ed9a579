//! Worker pool, timer scheduling and their error type.

pub mod error;
pub mod scheduler;
pub(crate) mod timer_queue;
pub mod worker_pool;

pub use error::{AppResult, PoolError};
pub use scheduler::{Repeat, RepeatState, TimerScheduler};
pub use timer_queue::RepeatId;
pub use worker_pool::{
    PoolStats, TaskHandle, TaskId, WorkerId, WorkerInfo, WorkerKind, WorkerPool, WorkerState,
};
