//! Pool and scheduler configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable overriding [`PoolConfig::core_threads`].
pub const ENV_CORE_THREADS: &str = "TIMER_POOL_CORE_THREADS";
/// Environment variable overriding [`PoolConfig::max_threads`].
pub const ENV_MAX_THREADS: &str = "TIMER_POOL_MAX_THREADS";
/// Environment variable overriding [`PoolConfig::max_queue_size`].
pub const ENV_MAX_QUEUE_SIZE: &str = "TIMER_POOL_MAX_QUEUE_SIZE";
/// Environment variable overriding [`PoolConfig::idle_timeout_ms`].
pub const ENV_IDLE_TIMEOUT_MS: &str = "TIMER_POOL_IDLE_TIMEOUT_MS";

/// Worker pool configuration.
///
/// ```
/// use prometheus_timer_pool::config::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_core_threads(2)
///     .with_max_threads(4)
///     .with_idle_timeout(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Workers started by `start` and kept until shutdown.
    pub core_threads: usize,
    /// Upper bound on live workers, core and overflow together.
    pub max_threads: usize,
    /// Queue length above which submissions log a backpressure warning.
    /// Advisory only: tasks are never rejected. `0` disables the warning.
    pub max_queue_size: usize,
    /// How long an overflow worker may sit idle before it retires.
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    /// One core worker per CPU, double that as the overflow ceiling.
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            core_threads: cpus,
            max_threads: cpus * 2,
            max_queue_size: 1024,
            idle_timeout_ms: 60_000,
        }
    }
}

impl PoolConfig {
    /// Creates a config with CPU-derived defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of core workers.
    #[must_use]
    pub const fn with_core_threads(mut self, core_threads: usize) -> Self {
        self.core_threads = core_threads;
        self
    }

    /// Sets the maximum number of live workers.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Sets the advisory queue size.
    #[must_use]
    pub const fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Sets the overflow idle timeout (millisecond precision).
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout_ms = u64::try_from(idle_timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Overflow idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.core_threads == 0 {
            return Err("core_threads must be greater than 0".into());
        }
        if self.max_threads < self.core_threads {
            return Err(format!(
                "max_threads ({}) must be >= core_threads ({})",
                self.max_threads, self.core_threads
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err("idle_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Applies `TIMER_POOL_*` overrides found in the process environment.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Some(v) = env_var(ENV_CORE_THREADS)? {
            self.core_threads = v;
        }
        if let Some(v) = env_var(ENV_MAX_THREADS)? {
            self.max_threads = v;
        }
        if let Some(v) = env_var(ENV_MAX_QUEUE_SIZE)? {
            self.max_queue_size = v;
        }
        if let Some(v) = env_var(ENV_IDLE_TIMEOUT_MS)? {
            self.idle_timeout_ms = v;
        }
        Ok(())
    }
}

fn env_var<T>(name: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot read {name}")),
    }
}

/// Timer scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Configuration of the pool that runs expired timers.
    pub pool: PoolConfig,
}

impl Default for SchedulerConfig {
    /// Four fixed workers, advisory queue of 40, 4s idle timeout.
    fn default() -> Self {
        Self {
            pool: PoolConfig {
                core_threads: 4,
                max_threads: 4,
                max_queue_size: 40,
                idle_timeout_ms: 4_000,
            },
        }
    }
}

impl SchedulerConfig {
    /// Validate the embedded pool configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        self.pool
            .validate()
            .map_err(|e| format!("scheduler pool invalid: {e}"))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the defaults plus `TIMER_POOL_*` environment
    /// variables, loading a `.env` file first when one exists.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        cfg.pool.apply_env()?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config_is_valid() {
        let cfg = PoolConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.max_threads >= cfg.core_threads);
    }

    #[test]
    fn test_idle_timeout_roundtrip() {
        let cfg = PoolConfig::new().with_idle_timeout(Duration::from_millis(250));
        assert_eq!(cfg.idle_timeout_ms, 250);
        assert_eq!(cfg.idle_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_scheduler_default_matches_timer_pool() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.pool.core_threads, 4);
        assert_eq!(cfg.pool.max_threads, 4);
        assert_eq!(cfg.pool.idle_timeout(), Duration::from_secs(4));
        assert!(cfg.validate().is_ok());
    }
}
