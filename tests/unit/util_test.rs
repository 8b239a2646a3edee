//! Tests for shared utilities

use resource_scheduler::util::{init_tracing, now_ms, GroupStatus};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_now_ms_is_recent() {
    // 2020-01-01T00:00:00Z
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_group_status_serialization() {
    assert_eq!(serde_json::to_string(&GroupStatus::Cancelled).unwrap(), "\"cancelled\"");
    let status: GroupStatus = serde_json::from_str("\"terminated\"").unwrap();
    assert_eq!(status, GroupStatus::Terminated);
}
