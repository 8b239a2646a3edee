//! Message contract, completion actions, and the default message type.
//!
//! A message is created by a producer, handed to the dispatcher with
//! [`MessageReceiver::receive`](crate::core::MessageReceiver::receive) and
//! eventually completed by the resource that sent it. Completion runs every
//! attached [`Action`] in attachment order; the dispatcher attaches its own
//! action during dispatch, which is how a finished send re-enters scheduling.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::error;

use crate::core::group::Group;
use crate::util::serde::{GroupId, MessageId};

/// A zero-argument callback run when a message completes.
///
/// Any `Fn() + Send + Sync` closure is an action.
pub trait Action: Send + Sync {
    /// Run the callback.
    fn perform(&self);
}

impl<F> Action for F
where
    F: Fn() + Send + Sync,
{
    fn perform(&self) {
        self();
    }
}

/// Ordered list of completion actions.
///
/// Actions are consumed by [`run_all`](Self::run_all): completing a message
/// releases every closure it captured, including the dispatcher's own.
#[derive(Default)]
pub struct CompletionActions {
    actions: Mutex<Vec<Box<dyn Action>>>,
}

impl CompletionActions {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn push(&self, action: Box<dyn Action>) {
        self.actions.lock().push(action);
    }

    /// Number of actions waiting to run.
    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    /// True when no action is attached.
    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Drain and run all actions in insertion order.
    ///
    /// The lock is released before any action runs, so an action may attach
    /// further actions; those run on the next call. A panicking action is
    /// logged and the remaining actions still run.
    pub fn run_all(&self) {
        let actions = std::mem::take(&mut *self.actions.lock());
        for (index, action) in actions.into_iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| action.perform())).is_err() {
                error!(action = index, "completion action panicked; continuing");
            }
        }
    }
}

impl fmt::Debug for CompletionActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionActions")
            .field("pending", &self.len())
            .finish()
    }
}

/// Contract between producers, resources, and the dispatcher.
pub trait Message: Send + Sync + Sized + 'static {
    /// Message identifier, used for logging and audit.
    fn id(&self) -> MessageId;

    /// Affinity key of the group this message belongs to.
    fn group_id(&self) -> GroupId;

    /// Whether this is the last message of its group.
    fn is_termination_message(&self) -> bool;

    /// Attach an action to run on completion.
    fn add_completed_action(&self, action: Box<dyn Action>);

    /// Invoked by the resource once processing is finished. Runs all attached
    /// actions in attachment order.
    fn completed(&self);

    /// Store a non-owning reference to the resolved group.
    ///
    /// The dispatcher calls this once during admission; later calls are
    /// ignored by the default implementation.
    fn set_group(&self, group: Weak<Group<Self>>);

    /// The group resolved during admission, if it is still alive.
    fn group(&self) -> Option<Arc<Group<Self>>>;
}

/// Default message implementation carrying an optional payload.
pub struct DefaultMessage<P = ()> {
    id: MessageId,
    group_id: GroupId,
    termination: bool,
    payload: P,
    actions: CompletionActions,
    group: OnceLock<Weak<Group<Self>>>,
}

impl DefaultMessage<()> {
    /// Create a message without a payload.
    #[must_use]
    pub fn new(id: MessageId, group_id: GroupId) -> Self {
        Self::with_payload(id, group_id, ())
    }
}

impl<P> DefaultMessage<P> {
    /// Create a message carrying `payload`.
    pub fn with_payload(id: MessageId, group_id: GroupId, payload: P) -> Self {
        Self {
            id,
            group_id,
            termination: false,
            payload,
            actions: CompletionActions::new(),
            group: OnceLock::new(),
        }
    }

    /// Mark this message as the last one of its group.
    #[must_use]
    pub fn terminating(mut self, termination: bool) -> Self {
        self.termination = termination;
        self
    }

    /// Borrow the payload.
    pub const fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P> Message for DefaultMessage<P>
where
    P: Send + Sync + 'static,
{
    fn id(&self) -> MessageId {
        self.id
    }

    fn group_id(&self) -> GroupId {
        self.group_id
    }

    fn is_termination_message(&self) -> bool {
        self.termination
    }

    fn add_completed_action(&self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    fn completed(&self) {
        self.actions.run_all();
    }

    fn set_group(&self, group: Weak<Group<Self>>) {
        let _ = self.group.set(group);
    }

    fn group(&self) -> Option<Arc<Group<Self>>> {
        self.group.get().and_then(Weak::upgrade)
    }
}

impl<P> PartialEq for DefaultMessage<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.group_id == other.group_id
    }
}

impl<P> Eq for DefaultMessage<P> {}

impl<P> fmt::Debug for DefaultMessage<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultMessage")
            .field("id", &self.id)
            .field("group_id", &self.group_id)
            .field("termination", &self.termination)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl<P> fmt::Display for DefaultMessage<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message{} (group{})", self.id, self.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_actions_run_in_insertion_order() {
        let msg = DefaultMessage::new(1, 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            msg.add_completed_action(Box::new(move || order.lock().push(tag)));
        }

        msg.completed();

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_completed_consumes_actions() {
        let msg = DefaultMessage::new(1, 1);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        msg.add_completed_action(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        msg.completed();
        msg.completed();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(msg.actions.is_empty());
    }

    #[test]
    fn test_panicking_action_does_not_skip_later_actions() {
        let msg = DefaultMessage::new(1, 1);
        let count = Arc::new(AtomicUsize::new(0));
        let before = Arc::clone(&count);
        let after = Arc::clone(&count);
        msg.add_completed_action(Box::new(move || {
            before.fetch_add(1, Ordering::SeqCst);
        }));
        msg.add_completed_action(Box::new(|| panic!("callback failed")));
        msg.add_completed_action(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));

        msg.completed();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(msg.actions.is_empty());
    }

    #[test]
    fn test_equality_by_id_and_group() {
        assert_eq!(DefaultMessage::new(1, 2), DefaultMessage::new(1, 2).terminating(true));
        assert_ne!(DefaultMessage::new(1, 2), DefaultMessage::new(1, 3));
        assert_ne!(DefaultMessage::new(1, 2), DefaultMessage::new(2, 2));
    }

    #[test]
    fn test_display() {
        assert_eq!(DefaultMessage::new(4, 3).to_string(), "message4 (group3)");
    }

    #[test]
    fn test_group_is_unset_before_admission() {
        let msg = DefaultMessage::new(1, 1);
        assert!(msg.group().is_none());
        assert!(!msg.is_termination_message());
        assert!(msg.terminating(true).is_termination_message());
    }

    #[test]
    fn test_payload_accessor() {
        let msg = DefaultMessage::with_payload(7, 1, "hello".to_string());
        assert_eq!(msg.payload(), "hello");
    }
}
