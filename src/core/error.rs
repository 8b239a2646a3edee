//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::worker_pool::PoolError;
use crate::util::serde::GroupId;

/// Errors produced by the dispatcher and its collaborators.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration rejected while constructing a component.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The group already admitted its termination message.
    #[error("group {0} has terminated; no further messages will be processed")]
    GroupTerminated(GroupId),
    /// The group was cancelled.
    #[error("group {0} was cancelled; no further messages will be processed")]
    GroupCancelled(GroupId),
    /// The resource handle is already registered with the pool.
    #[error("resource is already registered")]
    DuplicateResource,
    /// The resource handle was removed earlier and cannot rejoin.
    #[error("resource was removed from service")]
    ResourceRetired,
    /// The dispatcher no longer accepts work.
    #[error("dispatcher has been shut down")]
    Shutdown,
    /// Worker pool failure.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

impl SchedulerError {
    /// True for admission rejections a producer can recover from by dropping the message.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::GroupTerminated(_) | Self::GroupCancelled(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
