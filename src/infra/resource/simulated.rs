//! Resource that pretends to talk to an external system.
//!
//! Each send logs the message, sleeps for a fixed latency on the worker's
//! tokio runtime and then reports completion. The resource remembers which
//! messages it sent, in order, which makes it the workhorse of the test suite.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::core::{Gateway, Message, Resource};
use crate::util::serde::MessageId;

const DEFAULT_LATENCY: Duration = Duration::from_millis(1000);

/// Simulated resource with a fixed send latency.
pub struct SimulatedResource {
    name: String,
    latency: Duration,
    removed: AtomicBool,
    sent: AtomicU64,
    history: Mutex<Vec<MessageId>>,
}

impl SimulatedResource {
    /// Create a resource whose sends take `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self::named("simulated", latency)
    }

    /// Create a named resource; the name only shows up in logs.
    #[must_use]
    pub fn named(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            latency,
            removed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured send latency.
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    /// Number of messages sent so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    /// Ids of the messages sent so far, in send order.
    pub fn sent_ids(&self) -> Vec<MessageId> {
        self.history.lock().clone()
    }
}

impl Default for SimulatedResource {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}

impl fmt::Debug for SimulatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedResource")
            .field("name", &self.name)
            .field("latency", &self.latency)
            .field("removed", &self.removed.load(Ordering::Relaxed))
            .field("sent", &self.sent_count())
            .finish()
    }
}

#[async_trait]
impl<M: Message> Gateway<M> for SimulatedResource {
    async fn send(&self, message: Arc<M>) {
        info!(
            resource = %self.name,
            message_id = message.id(),
            group_id = message.group_id(),
            "sending message"
        );
        self.history.lock().push(message.id());
        tokio::time::sleep(self.latency).await;
        self.sent.fetch_add(1, Ordering::AcqRel);
        message.completed();
    }
}

impl<M: Message> Resource<M> for SimulatedResource {
    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn set_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DefaultMessage;

    #[tokio::test]
    async fn test_send_completes_message_after_latency() {
        let resource = SimulatedResource::new(Duration::from_millis(5));
        let message = Arc::new(DefaultMessage::new(3, 1));
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        message.add_completed_action(Box::new(move || flag.store(true, Ordering::SeqCst)));

        Gateway::<DefaultMessage>::send(&resource, Arc::clone(&message)).await;

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(resource.sent_count(), 1);
        assert_eq!(resource.sent_ids(), vec![3]);
    }

    #[test]
    fn test_removal_flag() {
        let resource = SimulatedResource::default();
        assert_eq!(resource.latency(), DEFAULT_LATENCY);
        assert!(!Resource::<DefaultMessage>::is_removed(&resource));
        Resource::<DefaultMessage>::set_removed(&resource);
        assert!(Resource::<DefaultMessage>::is_removed(&resource));
    }
}
