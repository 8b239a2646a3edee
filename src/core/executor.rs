//! Job execution traits and the send job the dispatcher submits.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::message::Message;
use crate::core::resource::PooledResource;

/// Executes jobs handed to a [`WorkerPool`](crate::core::WorkerPool).
///
/// On native platforms, `execute` is driven by a dedicated worker thread with
/// its own single-threaded tokio runtime, so blocking or slow I/O here never
/// stalls callers of the dispatcher.
#[async_trait]
pub trait WorkerExecutor<J>: Send + Sync + Clone + 'static
where
    J: Send + 'static,
{
    /// Run one job to completion.
    async fn execute(&self, job: J);
}

/// One `resource.send(message)` call.
pub struct SendJob<M: Message> {
    /// Message to deliver.
    pub message: Arc<M>,
    /// Resource the message was assigned to.
    pub resource: PooledResource<M>,
}

/// Executor that performs [`SendJob`]s by calling the resource's gateway.
pub struct SendExecutor<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> SendExecutor<M> {
    /// Create the executor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for SendExecutor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for SendExecutor<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> WorkerExecutor<SendJob<M>> for SendExecutor<M> {
    async fn execute(&self, job: SendJob<M>) {
        tracing::debug!(
            message_id = job.message.id(),
            group_id = job.message.group_id(),
            resource_id = job.resource.id(),
            "sending message"
        );
        job.resource.resource().send(job.message).await;
    }
}
