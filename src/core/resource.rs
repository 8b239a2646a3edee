//! Resource capability and the pool of registered/idle resources.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::message::Message;
use crate::util::serde::ResourceId;

/// How to interact with the external system.
///
/// `send` runs on a worker thread inside a single-threaded tokio runtime. The
/// implementation must call [`Message::completed`] exactly once, before or
/// after returning; completion is the only way a resource is handed its next
/// message. Failures are the implementation's concern: the dispatcher only
/// observes completion.
#[async_trait]
pub trait Gateway<M: Message>: Send + Sync + 'static {
    /// Deliver `message` to the external system.
    async fn send(&self, message: Arc<M>);
}

/// A gateway that can be taken out of service at runtime.
pub trait Resource<M: Message>: Gateway<M> {
    /// True once the resource has been removed from service. A removed
    /// resource finishes its current send but is not given another message.
    fn is_removed(&self) -> bool;

    /// Take the resource out of service. One-way.
    fn set_removed(&self);
}

/// Registered resource handle with its pool-assigned id.
pub struct PooledResource<M: Message> {
    id: ResourceId,
    resource: Arc<dyn Resource<M>>,
}

impl<M: Message> PooledResource<M> {
    /// Pool-assigned identifier.
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// The underlying resource.
    pub fn resource(&self) -> &Arc<dyn Resource<M>> {
        &self.resource
    }

    /// Whether the resource was taken out of service.
    pub fn is_removed(&self) -> bool {
        self.resource.is_removed()
    }

    fn is(&self, other: &Arc<dyn Resource<M>>) -> bool {
        Arc::ptr_eq(&self.resource, other)
    }
}

impl<M: Message> Clone for PooledResource<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<M: Message> fmt::Debug for PooledResource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Why a resource could not join the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The same handle is already registered.
    Duplicate,
    /// The handle was flagged removed.
    Retired,
}

/// All registered resources and the idle subset.
///
/// Both sets are internally synchronized and independent of the registry's
/// coordination lock. Identity is pointer identity of the shared handle.
pub struct ResourcePool<M: Message> {
    all: Mutex<Vec<PooledResource<M>>>,
    idle: Mutex<VecDeque<PooledResource<M>>>,
    next_id: AtomicU64,
}

impl<M: Message> Default for ResourcePool<M> {
    fn default() -> Self {
        Self {
            all: Mutex::new(Vec::new()),
            idle: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<M: Message> ResourcePool<M> {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the full set. It is not idle until
    /// [`release`](Self::release) is called for it.
    pub fn register(
        &self,
        resource: Arc<dyn Resource<M>>,
    ) -> Result<PooledResource<M>, RegisterError> {
        if resource.is_removed() {
            return Err(RegisterError::Retired);
        }
        let mut all = self.all.lock();
        if all.iter().any(|r| r.is(&resource)) {
            return Err(RegisterError::Duplicate);
        }
        let pooled = PooledResource {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            resource,
        };
        all.push(pooled.clone());
        Ok(pooled)
    }

    /// Remove a resource from both sets and flag it removed.
    ///
    /// Returns the pooled handle if the resource was registered.
    pub fn deregister(&self, resource: &Arc<dyn Resource<M>>) -> Option<PooledResource<M>> {
        resource.set_removed();
        let removed = {
            let mut all = self.all.lock();
            let idx = all.iter().position(|r| r.is(resource))?;
            all.swap_remove(idx)
        };
        self.idle.lock().retain(|r| !r.is(resource));
        Some(removed)
    }

    /// Take one idle resource, oldest first. Resources flagged removed while
    /// parked are skipped and dropped.
    pub fn take_idle(&self) -> Option<PooledResource<M>> {
        let mut idle = self.idle.lock();
        while let Some(resource) = idle.pop_front() {
            if !resource.is_removed() {
                return Some(resource);
            }
        }
        None
    }

    /// Return a resource to the idle set. Removed resources are dropped.
    pub fn release(&self, resource: PooledResource<M>) -> bool {
        if resource.is_removed() {
            return false;
        }
        self.idle.lock().push_back(resource);
        true
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.all.lock().len()
    }

    /// True when no resource is registered.
    pub fn is_empty(&self) -> bool {
        self.all.lock().is_empty()
    }

    /// Number of idle resources.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}
