//! Configuration models for worker pools and timer schedulers.

pub mod pool;

pub use pool::{
    PoolConfig, SchedulerConfig, ENV_CORE_THREADS, ENV_IDLE_TIMEOUT_MS, ENV_MAX_QUEUE_SIZE,
    ENV_MAX_THREADS,
};
