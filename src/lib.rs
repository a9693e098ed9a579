//! # Prometheus Timer Pool
//!
//! An elastic worker thread pool and a timer scheduler built on top of it.
//!
//! CPU-bound or blocking work goes to a [`core::WorkerPool`]: a fixed set of
//! core threads plus on-demand overflow threads that retire when idle. Work
//! that must run later, at a given instant, or periodically goes to a
//! [`core::TimerScheduler`], which keeps a time-ordered queue and hands due
//! entries to its own pool.
//!
//! ## Key Features
//!
//! - **Elastic sizing**: overflow workers are added only when no worker is idle
//!   and retire after `idle_timeout` without work
//! - **FIFO execution**: tasks start in submission order
//! - **Result handles**: `run` returns a [`core::TaskHandle`] with the closure's
//!   value, or the panic that ended it
//! - **Graceful and immediate shutdown**: drain the backlog or discard it
//! - **Timers**: one-shot delays, absolute times and repeating series with
//!   cancellation
//! - **Primitives**: [`CountDownLatch`] and [`SyncMap`], used internally and
//!   exported for callers
//!
//! ## WorkerPool
//!
//! ```rust
//! use prometheus_timer_pool::config::PoolConfig;
//! use prometheus_timer_pool::core::WorkerPool;
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(PoolConfig::new().with_core_threads(2).with_max_threads(8));
//! pool.start()?;
//!
//! let handle = pool.run(|| (1..=10).sum::<u32>())?;
//! assert_eq!(handle.wait()?, 55);
//!
//! pool.shutdown();
//! pool.await_termination(Duration::from_secs(5));
//! # Ok::<(), prometheus_timer_pool::core::PoolError>(())
//! ```
//!
//! ## TimerScheduler
//!
//! ```rust
//! use prometheus_timer_pool::core::{Repeat, TimerScheduler};
//! use std::time::Duration;
//!
//! let scheduler = TimerScheduler::new();
//! scheduler.start()?;
//!
//! scheduler.add_after_delay(Duration::from_millis(50), || println!("later"))?;
//! let id = scheduler.add_repeated(Repeat::Times(3), Duration::from_millis(10), || {
//!     println!("tick");
//! })?;
//!
//! scheduler.cancel(id);
//! scheduler.stop();
//! # Ok::<(), prometheus_timer_pool::core::PoolError>(())
//! ```
//!
//! For more, see:
//! - `tests/worker_pool_test.rs` - pool sizing and shutdown scenarios
//! - `tests/scheduler_test.rs` - timer ordering and repeat semantics

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Configuration models for pools and schedulers.
pub mod config;
/// Worker pool, timer scheduler and errors.
pub mod core;
/// Countdown latch.
pub mod latch;
/// Concurrent map.
pub mod sync_map;
/// Shared utilities.
pub mod util;

pub use latch::CountDownLatch;
pub use sync_map::SyncMap;
