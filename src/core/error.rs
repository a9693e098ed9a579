//! Error types for pool and scheduler operations.

use thiserror::Error;

/// Errors produced by the worker pool, the timer scheduler and task handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The pool is not accepting work (not started, shut down, or invalid).
    #[error("pool is unavailable")]
    PoolUnavailable,
    /// `start` was called on a pool that is already running.
    #[error("pool already started")]
    AlreadyStarted,
    /// The OS refused to create a worker thread.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Waiting for a task result timed out.
    #[error("operation timed out")]
    Timeout,
    /// The task panicked while running.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    /// The task was discarded before it ran.
    #[error("task abandoned before execution")]
    TaskAbandoned,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
