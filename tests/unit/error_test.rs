//! Tests for error types

use resource_scheduler::core::{PoolError, SchedulerError};

#[test]
fn test_rejection_messages() {
    let terminated = SchedulerError::GroupTerminated(7);
    assert_eq!(
        terminated.to_string(),
        "group 7 has terminated; no further messages will be processed"
    );
    assert!(terminated.is_rejection());
    assert!(SchedulerError::GroupCancelled(7).is_rejection());
}

#[test]
fn test_non_rejections() {
    assert!(!SchedulerError::Shutdown.is_rejection());
    assert!(!SchedulerError::DuplicateResource.is_rejection());
    assert!(!SchedulerError::InvalidConfig("x".into()).is_rejection());
}

#[test]
fn test_pool_error_conversion() {
    let err: SchedulerError = PoolError::PoolShutdown.into();
    assert!(matches!(err, SchedulerError::Pool(PoolError::PoolShutdown)));
    assert_eq!(err.to_string(), "worker pool error: pool has been shut down");
}

#[test]
fn test_anyhow_interop() {
    fn fails() -> resource_scheduler::core::AppResult<()> {
        Err(SchedulerError::ResourceRetired.into())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
