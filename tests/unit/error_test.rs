//! Tests for error types

use prometheus_timer_pool::core::PoolError;

#[test]
fn test_invalid_config_error() {
    let err = PoolError::InvalidConfig("core_threads must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: core_threads must be greater than 0"
    );
}

#[test]
fn test_pool_unavailable_error() {
    let err = PoolError::PoolUnavailable;
    assert_eq!(format!("{}", err), "pool is unavailable");
}

#[test]
fn test_already_started_error() {
    let err = PoolError::AlreadyStarted;
    assert_eq!(format!("{}", err), "pool already started");
}

#[test]
fn test_resource_exhausted_error() {
    let err = PoolError::ResourceExhausted("cannot spawn core worker".to_string());
    assert_eq!(format!("{}", err), "resource exhausted: cannot spawn core worker");
}

#[test]
fn test_handle_outcome_errors() {
    assert_eq!(format!("{}", PoolError::Timeout), "operation timed out");
    assert_eq!(
        format!("{}", PoolError::TaskPanicked("boom".to_string())),
        "task panicked: boom"
    );
    assert_eq!(
        format!("{}", PoolError::TaskAbandoned),
        "task abandoned before execution"
    );
}

#[test]
fn test_pool_error_into_anyhow() {
    let err: anyhow::Error = PoolError::PoolUnavailable.into();
    assert_eq!(err.to_string(), "pool is unavailable");
    assert_eq!(
        err.downcast_ref::<PoolError>(),
        Some(&PoolError::PoolUnavailable)
    );
}
