//! Tests for builder modules

use std::sync::Arc;

use prometheus_event_manager::builders::build_event_manager;
use prometheus_event_manager::config::EventManagerConfig;
use prometheus_event_manager::core::{
    EventOutcome, EventRequest, InMemoryNotifier, NotifyKind, MINIMUM_SLEEP_TIME_MS,
};
use prometheus_event_manager::util::{ManualClock, SleepType};

fn noop(name: &str) -> EventRequest {
    EventRequest::new(name, |_ctx, _payload| EventOutcome::ok())
}

#[test]
fn test_build_applies_config() {
    let mut cfg = EventManagerConfig {
        enabled: false,
        default_limit: 1,
        default_sleep_ms: Some(10),
        minimum_sleep_ms: Some(5),
        ..EventManagerConfig::default()
    };
    cfg.sleep_times.insert(SleepType::Socket, 200);
    cfg.minimum_sleep_times.insert(SleepType::Wait, 7);

    let manager = build_event_manager(&cfg, Arc::new(ManualClock::new(0)), None).unwrap();
    assert!(!manager.is_enabled());
    assert_eq!(manager.get_sleep_time(SleepType::Service), 10);
    assert_eq!(manager.get_sleep_time(SleepType::Socket), 200);
    assert_eq!(manager.get_minimum_sleep_time(SleepType::Service), 5);
    assert_eq!(manager.get_minimum_sleep_time(SleepType::Wait), 7);
    assert_eq!(manager.get_minimum_sleep_time(SleepType::Socket), 200);

    manager.enqueue(noop("a")).unwrap();
    assert!(manager.enqueue(noop("b")).is_err());
}

#[test]
fn test_build_default_floor() {
    let manager =
        build_event_manager(&EventManagerConfig::default(), Arc::new(ManualClock::new(0)), None)
            .unwrap();
    assert_eq!(
        manager.get_minimum_sleep_time(SleepType::Service),
        MINIMUM_SLEEP_TIME_MS
    );
}

#[test]
fn test_build_notify_disabled() {
    let sink = Arc::new(InMemoryNotifier::new(8));
    let cfg = EventManagerConfig {
        notify: false,
        ..EventManagerConfig::default()
    };
    let manager = build_event_manager(&cfg, Arc::new(ManualClock::new(0)), Some(sink.clone())).unwrap();
    manager.enqueue(noop("quiet")).unwrap();
    assert_eq!(sink.count(NotifyKind::Queued), 0);
}

#[test]
fn test_build_rejects_invalid() {
    let cfg = EventManagerConfig {
        minimum_sleep_ms: Some(0),
        ..EventManagerConfig::default()
    };
    let err = build_event_manager(&cfg, Arc::new(ManualClock::new(0)), None).unwrap_err();
    assert!(err.to_string().contains("config invalid"));
}
