//! Tests for configuration parsing and validation

use resource_scheduler::config::dispatcher::{
    ENV_DRAIN_TERMINATED_BACKLOG, ENV_INITIAL_RESOURCES, ENV_WORKER_COUNT,
};
use resource_scheduler::config::{DispatcherConfig, WorkerPoolConfig};

#[test]
fn test_from_json_str_partial_document_keeps_defaults() {
    let cfg = DispatcherConfig::from_json_str(
        r#"{ "drain_terminated_backlog": true, "worker_pool": { "worker_count": 3 } }"#,
    )
    .unwrap();
    assert!(cfg.drain_terminated_backlog);
    assert_eq!(cfg.worker_pool.worker_count, 3);
    assert_eq!(
        cfg.worker_pool.thread_stack_size,
        WorkerPoolConfig::default().thread_stack_size
    );
    assert_eq!(cfg.initial_resources, 0);
}

#[test]
fn test_from_json_str_rejects_invalid_values() {
    let err = DispatcherConfig::from_json_str(r#"{ "worker_pool": { "worker_count": 0 } }"#)
        .unwrap_err();
    assert!(err.contains("worker_count"));
}

#[test]
fn test_from_json_str_rejects_malformed_input() {
    let err = DispatcherConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_serializes_round_trip() {
    let cfg = DispatcherConfig::new()
        .with_initial_resources(2)
        .with_worker_pool(WorkerPoolConfig::new().with_worker_count(5));
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(DispatcherConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_from_env_reads_scheduler_variables() {
    std::env::set_var(ENV_WORKER_COUNT, "3");
    std::env::set_var(ENV_DRAIN_TERMINATED_BACKLOG, "true");
    std::env::set_var(ENV_INITIAL_RESOURCES, " 4 ");
    let cfg = DispatcherConfig::from_env().unwrap();
    assert_eq!(cfg.worker_pool.worker_count, 3);
    assert!(cfg.drain_terminated_backlog);
    assert_eq!(cfg.initial_resources, 4);

    std::env::set_var(ENV_WORKER_COUNT, "many");
    let err = DispatcherConfig::from_env().unwrap_err();
    assert!(err.to_string().contains(ENV_WORKER_COUNT));

    std::env::remove_var(ENV_WORKER_COUNT);
    std::env::remove_var(ENV_DRAIN_TERMINATED_BACKLOG);
    std::env::remove_var(ENV_INITIAL_RESOURCES);
}
