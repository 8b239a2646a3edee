//! Group-affinity dispatcher.
//!
//! The dispatcher owns the group registry, the resource pool and the worker
//! pool, and decides at every point a resource becomes free which message it
//! processes next:
//!
//! 1. **Admission** (`receive`): resolve the group, reject cancelled or
//!    terminated groups, then either hand the message to an idle resource or
//!    append it to the group's backlog.
//! 2. **Completion**: the resource calls `message.completed()`, which runs the
//!    action attached at dispatch. A removed resource is dropped; otherwise
//!    the same group's backlog is continued first (affinity).
//! 3. **Scan**: with no affinity target, the first selectable group in
//!    registration order gives up one message; if there is none the resource
//!    goes idle.
//!
//! "Take an idle resource or enqueue" and "pop from a group or go idle" both
//! run under the registry's coordination lock, so a message can never be
//! queued while a resource is concurrently parked idle.
//!
//! Re-dispatch never recurses: completion only submits a job to the worker
//! channel and returns.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//! dispatcher.add_resource(Arc::new(SimulatedResource::new(Duration::from_millis(50))))?;
//!
//! let message = Arc::new(DefaultMessage::new(1, 7));
//! message.add_completed_action(Box::new(|| println!("done")));
//! dispatcher.receive(message)?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::core::audit::{AuditAction, AuditEvent, AuditSink};
use crate::core::executor::{SendExecutor, SendJob};
use crate::core::group::GroupSnapshot;
use crate::core::message::Message;
use crate::core::registry::{pop_first_selectable, GroupRegistry};
use crate::core::resource::{PooledResource, RegisterError, Resource, ResourcePool};
use crate::core::worker_pool::{PoolError, PoolStats, WorkerPool};
use crate::core::SchedulerError;
use crate::util::serde::{GroupId, ResourceId};

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Handed straight to an idle resource; the backlog was bypassed.
    Dispatched {
        /// Resource that received the message.
        resource_id: ResourceId,
    },
    /// Appended to the group's backlog.
    Queued,
}

/// Anything that accepts outgoing messages.
pub trait MessageReceiver<M: Message> {
    /// Accept a message for delivery.
    ///
    /// # Errors
    ///
    /// Fails when the message's group is cancelled or terminated, or when the
    /// receiver no longer accepts work.
    fn receive(&self, message: Arc<M>) -> Result<Admission, SchedulerError>;
}

/// Point-in-time dispatcher statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Groups ever registered, tombstones included.
    pub groups: usize,
    /// Messages waiting in group backlogs.
    pub backlog: usize,
    /// Registered resources.
    pub total_resources: usize,
    /// Resources waiting for work.
    pub idle_resources: usize,
    /// Worker pool counters.
    pub worker: PoolStats,
}

type SendPool<M> = WorkerPool<SendJob<M>, SendExecutor<M>>;

struct Inner<M: Message> {
    registry: GroupRegistry<M>,
    resources: ResourcePool<M>,
    workers: SendPool<M>,
    drain_terminated: bool,
    audit: Option<Arc<dyn AuditSink>>,
}

/// Schedules messages onto a dynamic set of resources with group affinity.
///
/// Cheap to clone; clones share all state.
pub struct Dispatcher<M: Message> {
    inner: Arc<Inner<M>>,
}

impl<M: Message> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Message> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<M: Message> Dispatcher<M> {
    /// Create a dispatcher with no resources.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration fails validation, `Pool` if the
    /// worker threads cannot be started.
    pub fn new(config: DispatcherConfig) -> Result<Self, SchedulerError> {
        Self::build(config, None)
    }

    /// Create a dispatcher that records every decision to `audit`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_audit(
        config: DispatcherConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, SchedulerError> {
        Self::build(config, Some(audit))
    }

    fn build(
        config: DispatcherConfig,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let workers = WorkerPool::new(config.worker_pool.clone(), SendExecutor::new())?;
        info!(
            worker_count = config.worker_pool.worker_count,
            drain_terminated_backlog = config.drain_terminated_backlog,
            "dispatcher started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                registry: GroupRegistry::new(),
                resources: ResourcePool::new(),
                workers,
                drain_terminated: config.drain_terminated_backlog,
                audit,
            }),
        })
    }

    /// Admit a message: dispatch it to an idle resource or queue it in its group.
    ///
    /// # Errors
    ///
    /// `GroupTerminated` / `GroupCancelled` when the group no longer accepts
    /// messages (nothing is mutated), `Shutdown` after [`shutdown`](Self::shutdown).
    pub fn receive(&self, message: Arc<M>) -> Result<Admission, SchedulerError> {
        let inner = &self.inner;
        if inner.workers.is_shutdown() {
            return Err(SchedulerError::Shutdown);
        }

        let group_id = message.group_id();
        let group = inner.registry.get_or_create(group_id);

        let assigned = {
            let coordination = inner.registry.coordinate();
            let mut state = group.lock();
            let rejection = if state.is_terminated() {
                Some(SchedulerError::GroupTerminated(group_id))
            } else if state.is_cancelled() {
                Some(SchedulerError::GroupCancelled(group_id))
            } else {
                None
            };
            if let Some(err) = rejection {
                drop(state);
                drop(coordination);
                warn!(group_id, message_id = message.id(), error = %err, "message rejected");
                inner.record(AuditEvent::new(AuditAction::Rejected).message(message.id(), group_id));
                return Err(err);
            }

            state.mark_terminated(message.is_termination_message());
            message.set_group(Arc::downgrade(&group));

            let idle = inner.resources.take_idle();
            if idle.is_none() {
                state.push(Arc::clone(&message));
            }
            idle
        };

        match assigned {
            Some(resource) => {
                let resource_id = resource.id();
                inner.dispatch(message, resource).map_err(|e| match e {
                    PoolError::PoolShutdown => SchedulerError::Shutdown,
                    other => SchedulerError::Pool(other),
                })?;
                Ok(Admission::Dispatched { resource_id })
            }
            None => {
                debug!(group_id, message_id = message.id(), "message queued");
                inner.record(AuditEvent::new(AuditAction::Queued).message(message.id(), group_id));
                Ok(Admission::Queued)
            }
        }
    }

    /// Register a resource and put it to work on any eligible backlog.
    ///
    /// # Errors
    ///
    /// `DuplicateResource` if the handle is already registered,
    /// `ResourceRetired` if it was flagged removed, `Shutdown` after shutdown.
    pub fn add_resource(&self, resource: Arc<dyn Resource<M>>) -> Result<ResourceId, SchedulerError> {
        let inner = &self.inner;
        if inner.workers.is_shutdown() {
            return Err(SchedulerError::Shutdown);
        }
        let pooled = inner.resources.register(resource).map_err(|e| match e {
            RegisterError::Duplicate => SchedulerError::DuplicateResource,
            RegisterError::Retired => SchedulerError::ResourceRetired,
        })?;
        let resource_id = pooled.id();
        info!(resource_id, "resource added");
        inner.record(AuditEvent::new(AuditAction::ResourceAdded).resource(resource_id));
        inner.assign_idle(pooled);
        Ok(resource_id)
    }

    /// Take a resource out of service.
    ///
    /// A send already running on it completes normally, but the resource is
    /// then discarded instead of being given another message. Returns `false`
    /// if the resource was not registered.
    pub fn remove_resource(&self, resource: &Arc<dyn Resource<M>>) -> bool {
        let Some(pooled) = self.inner.resources.deregister(resource) else {
            return false;
        };
        info!(resource_id = pooled.id(), "resource removed");
        self.inner
            .record(AuditEvent::new(AuditAction::ResourceRemoved).resource(pooled.id()));
        true
    }

    /// Cancel a group. Later admissions fail and its backlog is abandoned;
    /// sends already in flight complete normally.
    pub fn cancel_group(&self, group_id: GroupId) {
        let group = self.inner.registry.get_or_create(group_id);
        group.cancel();
        info!(group_id, "group cancelled");
        self.inner
            .record(AuditEvent::new(AuditAction::Cancelled).group(group_id));
    }

    /// Stop accepting work and release the worker threads.
    ///
    /// Queued sends are dropped and running sends are not awaited beyond the
    /// configured grace period.
    pub fn shutdown(&self) {
        self.inner.workers.shutdown();
        info!("dispatcher shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.workers.is_shutdown()
    }

    /// Snapshot of a group, if it was ever registered.
    pub fn group(&self, group_id: GroupId) -> Option<GroupSnapshot> {
        self.inner.registry.get(group_id).map(|g| g.snapshot())
    }

    /// Snapshots of every group in registration order.
    pub fn groups(&self) -> Vec<GroupSnapshot> {
        self.inner.registry.snapshots()
    }

    /// Current statistics.
    pub fn stats(&self) -> DispatcherStats {
        let inner = &self.inner;
        DispatcherStats {
            groups: inner.registry.len(),
            backlog: inner.registry.backlog_len(),
            total_resources: inner.resources.len(),
            idle_resources: inner.resources.idle_len(),
            worker: inner.workers.stats(),
        }
    }
}

impl<M: Message> MessageReceiver<M> for Dispatcher<M> {
    fn receive(&self, message: Arc<M>) -> Result<Admission, SchedulerError> {
        Self::receive(self, message)
    }
}

impl<M: Message> Inner<M> {
    fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    /// Attach the completion action, then hand the send to a worker.
    ///
    /// The action is attached before the job enters the channel, so the
    /// worker that runs `send` always sees it. If the pool refuses the job the
    /// resource goes back to the idle set and the message is dropped; group
    /// flags already applied by admission stay as they are.
    fn dispatch(self: &Arc<Self>, message: Arc<M>, resource: PooledResource<M>) -> Result<(), PoolError> {
        let dispatcher = Arc::downgrade(self);
        let completed = Arc::downgrade(&message);
        let owner = resource.clone();
        message.add_completed_action(Box::new(move || {
            if let (Some(inner), Some(message)) = (dispatcher.upgrade(), completed.upgrade()) {
                inner.on_completed(&message, owner.clone());
            }
        }));

        debug!(
            group_id = message.group_id(),
            message_id = message.id(),
            resource_id = resource.id(),
            "message dispatched"
        );
        self.record(
            AuditEvent::new(AuditAction::Dispatched)
                .message(message.id(), message.group_id())
                .resource(resource.id()),
        );
        let fallback = resource.clone();
        self.workers.submit(SendJob { message, resource }).inspect_err(|_| {
            self.resources.release(fallback);
        })
    }

    fn dispatch_or_drop(self: &Arc<Self>, message: Arc<M>, resource: PooledResource<M>) {
        let (group_id, message_id, resource_id) = (message.group_id(), message.id(), resource.id());
        if let Err(e) = self.dispatch(message, resource) {
            warn!(group_id, message_id, resource_id, error = %e, "dispatch failed; message dropped, resource released");
        }
    }

    /// Runs on the thread that called `message.completed()`.
    fn on_completed(self: &Arc<Self>, message: &Arc<M>, resource: PooledResource<M>) {
        let (group_id, message_id) = (message.group_id(), message.id());
        self.record(
            AuditEvent::new(AuditAction::Completed)
                .message(message_id, group_id)
                .resource(resource.id()),
        );

        if resource.is_removed() {
            debug!(resource_id = resource.id(), "removed resource finished its last send");
            self.record(AuditEvent::new(AuditAction::ResourceDiscarded).resource(resource.id()));
            return;
        }

        match message.group().and_then(|group| group.pop_next()) {
            Some(next) => {
                debug!(group_id, resource_id = resource.id(), "continuing group");
                self.dispatch_or_drop(next, resource);
            }
            None => self.assign_idle(resource),
        }
    }

    /// Give `resource` the next message from the first selectable group, or
    /// park it idle. Both outcomes are decided under the coordination lock.
    fn assign_idle(self: &Arc<Self>, resource: PooledResource<M>) {
        let groups = self.registry.coordinate();
        if let Some(next) = pop_first_selectable(&groups, self.drain_terminated) {
            drop(groups);
            self.dispatch_or_drop(next, resource);
            return;
        }

        let resource_id = resource.id();
        let parked = self.resources.release(resource);
        drop(groups);
        if parked {
            debug!(resource_id, "resource idle");
        } else {
            debug!(resource_id, "removed resource not returned to idle");
            self.record(AuditEvent::new(AuditAction::ResourceDiscarded).resource(resource_id));
        }
    }
}
