//! Group registry: lazy, idempotent group creation plus the ordered list the
//! idle-resource scan walks.
//!
//! Lookup and lazy creation go through a `DashMap`, so resolving a group
//! never waits on the coordination lock. The insertion-ordered list doubles
//! as that lock: admission and every scan-and-pop sequence hold it for their
//! whole duration, so those steps serialize across all groups.
//!
//! Lock order: map shard, then coordination list, then group state.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::core::group::{Group, GroupSnapshot};
use crate::util::serde::GroupId;

/// Guard over the ordered group list. Holding it is holding the coordination lock.
pub type CoordinationGuard<'a, M> = MutexGuard<'a, Vec<Arc<Group<M>>>>;

/// Registry of every group ever seen.
pub struct GroupRegistry<M> {
    by_id: DashMap<GroupId, Arc<Group<M>>>,
    ordered: Mutex<Vec<Arc<Group<M>>>>,
}

impl<M> Default for GroupRegistry<M> {
    fn default() -> Self {
        Self {
            by_id: DashMap::new(),
            ordered: Mutex::new(Vec::new()),
        }
    }
}

impl<M> GroupRegistry<M> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the group for `id`, creating and registering it on first use.
    ///
    /// Creation happens inside the map entry, so concurrent callers for the
    /// same id always observe one instance.
    pub fn get_or_create(&self, id: GroupId) -> Arc<Group<M>> {
        if let Some(group) = self.by_id.get(&id) {
            return Arc::clone(group.value());
        }
        let entry = self.by_id.entry(id).or_insert_with(|| {
            let group = Arc::new(Group::new(id));
            self.ordered.lock().push(Arc::clone(&group));
            tracing::debug!(group_id = id, "group registered");
            group
        });
        Arc::clone(entry.value())
    }

    /// Look up an existing group without creating it.
    pub fn get(&self, id: GroupId) -> Option<Arc<Group<M>>> {
        self.by_id.get(&id).map(|g| Arc::clone(g.value()))
    }

    /// Acquire the coordination lock.
    pub fn coordinate(&self) -> CoordinationGuard<'_, M> {
        self.ordered.lock()
    }

    /// Number of registered groups.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when no group was ever registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Snapshots of all groups in registration order.
    pub fn snapshots(&self) -> Vec<GroupSnapshot> {
        self.coordinate().iter().map(|g| g.snapshot()).collect()
    }

    /// Total number of queued messages across all groups.
    pub fn backlog_len(&self) -> usize {
        self.coordinate().iter().map(|g| g.lock().backlog_len()).sum()
    }
}

/// Pop one message from the first selectable group, in registration order.
///
/// Must be called with the coordination lock held; the guard is the proof.
pub fn pop_first_selectable<M>(
    groups: &CoordinationGuard<'_, M>,
    drain_terminated: bool,
) -> Option<Arc<M>> {
    groups.iter().find_map(|group| {
        let mut state = group.lock();
        if state.is_selectable(drain_terminated) {
            state.pop()
        } else {
            None
        }
    })
}
