//! Tests for audit sinks

use resource_scheduler::core::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};

#[test]
fn test_in_memory_sink_is_bounded() {
    let sink = InMemoryAuditSink::new(3);
    for id in 0..5 {
        sink.record(AuditEvent::new(AuditAction::Queued).message(id, 1));
    }
    let ids: Vec<_> = sink.events().iter().filter_map(|e| e.message_id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let sink = InMemoryAuditSink::new(0);
    sink.record(AuditEvent::new(AuditAction::Completed));
    assert!(sink.events().is_empty());
}

#[test]
fn test_filter_by_action() {
    let sink = InMemoryAuditSink::new(10);
    sink.record(AuditEvent::new(AuditAction::ResourceAdded).resource(1));
    sink.record(AuditEvent::new(AuditAction::Dispatched).message(1, 1).resource(1));
    sink.record(AuditEvent::new(AuditAction::ResourceRemoved).resource(1));
    assert_eq!(sink.events_with(AuditAction::Dispatched).len(), 1);
    assert_eq!(sink.events_with(AuditAction::Rejected).len(), 0);
}

#[test]
fn test_event_serializes_with_snake_case_action() {
    let event = AuditEvent::new(AuditAction::ResourceDiscarded).resource(9);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "resource_discarded");
    assert_eq!(json["resource_id"], 9);
    assert!(json["message_id"].is_null());
}

#[test]
fn test_tracing_sink_accepts_events() {
    TracingAuditSink.record(AuditEvent::new(AuditAction::Cancelled).group(2));
}
