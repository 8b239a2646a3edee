//! Tests for dispatcher builders

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resource_scheduler::builders::DispatcherBuilder;
use resource_scheduler::config::{DispatcherConfig, WorkerPoolConfig};
use resource_scheduler::core::{
    AuditAction, DefaultMessage, InMemoryAuditSink, Resource, SchedulerError,
};
use resource_scheduler::infra::SimulatedResource;

fn config() -> DispatcherConfig {
    DispatcherConfig::new().with_worker_pool(
        WorkerPoolConfig::new()
            .with_worker_count(1)
            .with_shutdown_timeout_ms(200),
    )
}

#[test]
fn test_factory_called_initial_resources_times() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let dispatcher = DispatcherBuilder::<DefaultMessage>::new(config().with_initial_resources(3))
        .resource_factory(move |idx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(SimulatedResource::named(format!("r{idx}"), Duration::from_millis(1)))
                as Arc<dyn Resource<DefaultMessage>>
        })
        .build()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let stats = dispatcher.stats();
    assert_eq!(stats.total_resources, 3);
    assert_eq!(stats.idle_resources, 3);
    dispatcher.shutdown();
}

#[test]
fn test_default_factory_builds_simulated_resources() {
    let dispatcher = DispatcherBuilder::<DefaultMessage>::new(config().with_initial_resources(2))
        .build()
        .unwrap();
    assert_eq!(dispatcher.stats().total_resources, 2);
    dispatcher.shutdown();
}

#[test]
fn test_explicit_resources_and_audit() {
    let audit = InMemoryAuditSink::new(16);
    let dispatcher = DispatcherBuilder::<DefaultMessage>::new(config())
        .audit(Arc::new(audit.clone()))
        .resource(Arc::new(SimulatedResource::new(Duration::from_millis(1))))
        .resources(vec![
            Arc::new(SimulatedResource::new(Duration::from_millis(1))) as Arc<dyn Resource<DefaultMessage>>,
        ])
        .build()
        .unwrap();

    assert_eq!(dispatcher.stats().total_resources, 2);
    assert_eq!(audit.events_with(AuditAction::ResourceAdded).len(), 2);
    dispatcher.shutdown();
}

#[test]
fn test_duplicate_resource_fails_build() {
    let shared: Arc<dyn Resource<DefaultMessage>> =
        Arc::new(SimulatedResource::new(Duration::from_millis(1)));
    let result = DispatcherBuilder::new(config())
        .resource(Arc::clone(&shared))
        .resource(shared)
        .build();
    assert!(matches!(result, Err(SchedulerError::DuplicateResource)));
}

#[test]
fn test_invalid_config_fails_build() {
    let cfg = DispatcherConfig::new().with_worker_pool(WorkerPoolConfig::new().with_worker_count(0));
    let result = DispatcherBuilder::<DefaultMessage>::new(cfg).build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
