//! Tests for error types

use prometheus_event_manager::core::EventError;
use prometheus_event_manager::util::ReturnCode;

#[test]
fn test_not_accepting_error() {
    let err = EventError::NotAccepting("events".to_string());
    assert_eq!(format!("{}", err), "not accepting events");
}

#[test]
fn test_limit_exceeded_error() {
    let err = EventError::LimitExceeded("normal queue".to_string());
    assert_eq!(format!("{}", err), "normal queue limit would be exceeded");
}

#[test]
fn test_not_found_error() {
    let err = EventError::NotFound("after#3".to_string());
    assert_eq!(format!("{}", err), "event \"after#3\" doesn't exist");
}

#[test]
fn test_exhausted_error() {
    let err = EventError::Exhausted { processed: 4 };
    assert_eq!(format!("{}", err), "no more events are ready, processed: 4");
}

#[test]
fn test_callback_failure_error() {
    let err = EventError::callback(ReturnCode::Break, "stopped");
    assert_eq!(format!("{}", err), "callback failed (break): stopped");
}

#[test]
fn test_aggregate_flattens_to_slice() {
    let err = EventError::Aggregate {
        processed: 1,
        errors: vec![EventError::Timeout],
    };
    assert_eq!(err.errors(), &[EventError::Timeout]);
    assert_eq!(
        format!("{}", err),
        "1 error(s) while processing 1 event(s): timed out"
    );
}
