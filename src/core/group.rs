//! Per-affinity-key backlog with cancellation and termination flags.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::util::serde::{GroupId, GroupStatus};

/// Mutable group state. Flags live under the same lock as the backlog they
/// qualify.
pub struct GroupState<M> {
    backlog: VecDeque<Arc<M>>,
    cancelled: bool,
    terminated: bool,
}

impl<M> GroupState<M> {
    /// Messages waiting for a resource, oldest first.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }

    /// Set by [`Group::cancel`]; one-way.
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Set when a termination message was admitted; one-way.
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the idle-resource scan may pop from this group.
    pub fn is_selectable(&self, drain_terminated: bool) -> bool {
        !self.cancelled && (drain_terminated || !self.terminated) && !self.backlog.is_empty()
    }

    pub(crate) fn mark_terminated(&mut self, terminated: bool) {
        self.terminated |= terminated;
    }

    pub(crate) fn push(&mut self, message: Arc<M>) {
        self.backlog.push_back(message);
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<M>> {
        self.backlog.pop_front()
    }
}

/// A group of messages sharing an affinity key.
///
/// Groups are created lazily by the registry and never removed, so a
/// cancelled or terminated group stays a tombstone for its id.
pub struct Group<M> {
    id: GroupId,
    state: Mutex<GroupState<M>>,
}

impl<M> Group<M> {
    pub(crate) const fn new(id: GroupId) -> Self {
        Self {
            id,
            state: Mutex::new(GroupState {
                backlog: VecDeque::new(),
                cancelled: false,
                terminated: false,
            }),
        }
    }

    /// Group identifier.
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// Lock the group state.
    pub fn lock(&self) -> MutexGuard<'_, GroupState<M>> {
        self.state.lock()
    }

    /// Mark the group cancelled. Queued messages are abandoned.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
    }

    /// Whether the group was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Whether the group admitted its termination message.
    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Pop the oldest queued message unless the group was cancelled.
    pub(crate) fn pop_next(&self) -> Option<Arc<M>> {
        let mut state = self.state.lock();
        if state.cancelled {
            return None;
        }
        state.pop()
    }

    /// Point-in-time view of the group.
    pub fn snapshot(&self) -> GroupSnapshot {
        let state = self.state.lock();
        GroupSnapshot {
            id: self.id,
            backlog: state.backlog.len(),
            cancelled: state.cancelled,
            terminated: state.terminated,
        }
    }
}

impl<M> PartialEq for Group<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for Group<M> {}

impl<M> fmt::Debug for Group<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<M> fmt::Display for Group<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group{}", self.id)
    }
}

/// Serializable view of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    /// Group identifier.
    pub id: GroupId,
    /// Queued message count.
    pub backlog: usize,
    /// Cancellation flag.
    pub cancelled: bool,
    /// Termination flag.
    pub terminated: bool,
}

impl GroupSnapshot {
    /// Collapse the flags into a status. Cancellation wins when both are set.
    #[must_use]
    pub const fn status(&self) -> GroupStatus {
        if self.cancelled {
            GroupStatus::Cancelled
        } else if self.terminated {
            GroupStatus::Terminated
        } else {
            GroupStatus::Active
        }
    }
}
