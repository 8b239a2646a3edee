//! Identifier types shared across the scheduler.

use serde::{Deserialize, Serialize};

/// Identifier of a message, unique within its group.
pub type MessageId = u64;

/// Affinity key shared by related messages.
pub type GroupId = u64;

/// Identifier assigned to a resource when it joins a pool.
pub type ResourceId = u64;

/// Observable lifecycle state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Accepting admissions and eligible for selection.
    Active,
    /// A termination message was admitted.
    Terminated,
    /// The group was cancelled explicitly.
    Cancelled,
}
