//! Core scheduling abstractions: messages, groups, resources and the dispatcher.

pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod group;
pub mod message;
pub mod registry;
pub mod resource;
pub mod worker_pool;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use dispatcher::{Admission, Dispatcher, DispatcherStats, MessageReceiver};
pub use error::{AppResult, SchedulerError};
pub use executor::{SendExecutor, SendJob, WorkerExecutor};
pub use group::{Group, GroupSnapshot, GroupState};
pub use message::{Action, CompletionActions, DefaultMessage, Message};
pub use registry::GroupRegistry;
pub use resource::{Gateway, PooledResource, RegisterError, Resource, ResourcePool};
pub use worker_pool::{PoolError, PoolStats, WorkerPool};
