//! # Resource Scheduler
//!
//! A group-affinity dispatcher that shares a small, dynamic set of
//! capacity-limited resources between many message producers.
//!
//! Every message belongs to a group. When a resource finishes a send it keeps
//! working through the same group's backlog before looking at any other group,
//! so related messages stay together without pinning a group to a resource.
//!
//! ## Key Features
//!
//! - **Group Affinity**: a completing resource continues its group's backlog first
//! - **Immediate Dispatch**: a message admitted while a resource is idle skips the backlog
//! - **Resource Churn**: resources join and leave at runtime; a removed resource
//!   finishes its current send and is then discarded
//! - **Termination & Cancellation**: a termination message closes its group;
//!   cancellation abandons the group's backlog
//! - **Worker Thread Pool**: sends run on dedicated OS threads, each driving a
//!   single-threaded tokio runtime
//! - **Audit Trail**: optional sink recording every scheduling decision
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use resource_scheduler::builders::DispatcherBuilder;
//! use resource_scheduler::config::DispatcherConfig;
//! use resource_scheduler::core::{DefaultMessage, Message};
//! use resource_scheduler::infra::SimulatedResource;
//!
//! let dispatcher = DispatcherBuilder::new(DispatcherConfig::default())
//!     .resource(Arc::new(SimulatedResource::new(Duration::from_millis(100))))
//!     .build()?;
//!
//! let message = Arc::new(DefaultMessage::new(1, 42));
//! message.add_completed_action(Box::new(|| println!("sent")));
//! dispatcher.receive(message)?;
//!
//! // Closes group 42 once this message is admitted.
//! dispatcher.receive(Arc::new(DefaultMessage::new(2, 42).terminating(true)))?;
//! ```
//!
//! For complete scenarios, see `tests/dispatcher_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: messages, groups, resources and the dispatcher.
pub mod core;
/// Configuration models for the dispatcher and its worker pool.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Infrastructure adapters: concrete resources.
pub mod infra;
/// Shared utilities.
pub mod util;
