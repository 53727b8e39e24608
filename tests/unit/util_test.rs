//! Tests for utility functions

use prometheus_event_manager::util::{
    init_tracing, Clock, EventFlags, EventPriority, ManualClock, ReturnCode, SleepType,
};

#[test]
fn test_priority_ordering() {
    assert!(EventPriority::Immediate < EventPriority::Normal);
    assert!(EventPriority::Normal < EventPriority::Idle);
    assert_eq!(EventPriority::default(), EventPriority::Automatic);
}

#[test]
fn test_priority_display() {
    assert_eq!(EventPriority::After.to_string(), "after");
}

#[test]
fn test_return_code() {
    assert!(ReturnCode::Ok.is_ok());
    assert!(!ReturnCode::Continue.is_ok());
    assert_eq!(ReturnCode::Return.to_string(), "return");
}

#[test]
fn test_service_flags() {
    assert!(EventFlags::SERVICE.contains(EventFlags::IDLE));
    assert!(EventFlags::SERVICE.contains(EventFlags::QUEUED));
    assert_eq!(EventFlags::default(), EventFlags::empty());
}

#[test]
fn test_sleep_type_all() {
    assert_eq!(SleepType::ALL.len(), 4);
    assert!(SleepType::ALL.contains(&SleepType::Socket));
}

#[test]
fn test_manual_clock() {
    let clock = ManualClock::new(5);
    clock.advance(10);
    assert_eq!(clock.now_ms(), 15);
}

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
    tracing::info!(target: "util_test", "subscriber installed");
}
