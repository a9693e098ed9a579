//! Tests for configuration validation

use prometheus_timer_pool::config::{
    PoolConfig, SchedulerConfig, ENV_CORE_THREADS, ENV_IDLE_TIMEOUT_MS, ENV_MAX_QUEUE_SIZE,
    ENV_MAX_THREADS,
};
use std::time::Duration;

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig {
        core_threads: 2,
        max_threads: 4,
        max_queue_size: 100,
        idle_timeout_ms: 500,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_core_threads() {
    let invalid = PoolConfig {
        core_threads: 0,
        max_threads: 4,
        max_queue_size: 100,
        idle_timeout_ms: 500,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_max_below_core() {
    let invalid = PoolConfig {
        core_threads: 4,
        max_threads: 2,
        max_queue_size: 100,
        idle_timeout_ms: 500,
    };
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("max_threads"));
}

#[test]
fn test_pool_config_invalid_timeout() {
    let invalid = PoolConfig::new().with_idle_timeout(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_zero_queue_size_is_allowed() {
    let cfg = PoolConfig::new().with_max_queue_size(0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "pool": {
            "core_threads": 2,
            "max_threads": 3,
            "max_queue_size": 40,
            "idle_timeout_ms": 200
        }
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.pool.max_threads, 3);
    assert_eq!(config.pool.idle_timeout(), Duration::from_millis(200));
}

#[test]
fn test_scheduler_config_from_json_rejects_invalid() {
    let json = r#"{
        "pool": {
            "core_threads": 0,
            "max_threads": 3,
            "max_queue_size": 40,
            "idle_timeout_ms": 200
        }
    }"#;
    let err = SchedulerConfig::from_json_str(json).unwrap_err();
    assert!(err.starts_with("scheduler pool invalid"));

    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
}

#[test]
fn test_scheduler_config_from_env() {
    std::env::set_var(ENV_CORE_THREADS, "3");
    std::env::set_var(ENV_MAX_THREADS, "6");
    std::env::set_var(ENV_MAX_QUEUE_SIZE, "12");
    std::env::set_var(ENV_IDLE_TIMEOUT_MS, "750");

    let config = SchedulerConfig::from_env().unwrap();
    assert_eq!(
        config.pool,
        PoolConfig {
            core_threads: 3,
            max_threads: 6,
            max_queue_size: 12,
            idle_timeout_ms: 750,
        }
    );

    std::env::set_var(ENV_MAX_THREADS, "lots");
    let err = SchedulerConfig::from_env().unwrap_err();
    assert!(err.to_string().contains(ENV_MAX_THREADS));

    for name in [ENV_CORE_THREADS, ENV_MAX_THREADS, ENV_MAX_QUEUE_SIZE, ENV_IDLE_TIMEOUT_MS] {
        std::env::remove_var(name);
    }
}
