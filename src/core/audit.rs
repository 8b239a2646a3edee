//! Audit trail of dispatch decisions.
//!
//! The dispatcher records one event per scheduling decision when a sink is
//! attached. Sinks must be cheap: they are called inline on admission and
//! completion paths, outside the coordination lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::serde::{GroupId, MessageId, ResourceId};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Message handed to a resource.
    Dispatched,
    /// Message appended to its group's backlog.
    Queued,
    /// Message refused because its group is cancelled or terminated.
    Rejected,
    /// Resource reported completion of a message.
    Completed,
    /// Group cancelled.
    Cancelled,
    /// Resource joined the pool.
    ResourceAdded,
    /// Resource left the pool.
    ResourceRemoved,
    /// Removed resource finished its last send and was dropped.
    ResourceDiscarded,
}

impl AuditAction {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Queued => "queued",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::ResourceAdded => "resource_added",
            Self::ResourceRemoved => "resource_removed",
            Self::ResourceDiscarded => "resource_discarded",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier (uuid v4).
    pub event_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Related message, if any.
    pub message_id: Option<MessageId>,
    /// Related group, if any.
    pub group_id: Option<GroupId>,
    /// Related resource, if any.
    pub resource_id: Option<ResourceId>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

impl AuditEvent {
    /// New event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            action,
            message_id: None,
            group_id: None,
            resource_id: None,
            created_at_ms: now_ms(),
        }
    }

    /// Attach a message and its group.
    #[must_use]
    pub fn message(mut self, message_id: MessageId, group_id: GroupId) -> Self {
        self.message_id = Some(message_id);
        self.group_id = Some(group_id);
        self
    }

    /// Attach a group.
    #[must_use]
    pub fn group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Attach a resource.
    #[must_use]
    pub fn resource(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink with a bounded buffer.
///
/// Clones share the buffer, so a caller can keep one handle and give another
/// to the dispatcher.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink keeping at most `max_events`.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events with the given action, oldest first.
    pub fn events_with(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if self.max_events == 0 {
            return;
        }
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

impl fmt::Debug for InMemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAuditSink")
            .field("len", &self.events.lock().len())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::debug!(
            event_id = %event.event_id,
            action = %event.action,
            message_id = ?event.message_id,
            group_id = ?event.group_id,
            resource_id = ?event.resource_id,
            "audit"
        );
    }
}
