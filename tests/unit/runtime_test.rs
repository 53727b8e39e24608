//! Tests for runtime API models

use std::sync::Arc;

use prometheus_event_manager::core::{EventManager, EventState, HostContext, DispatchOptions};
use prometheus_event_manager::runtime::{dump_manager, health, submit_script, ScriptSubmission};
use prometheus_event_manager::util::{EventFlags, EventPriority, ManualClock};

fn submission(name: &str, script: &str) -> ScriptSubmission {
    ScriptSubmission {
        name: name.to_string(),
        script: script.to_string(),
        flags: EventFlags::empty(),
        priority: EventPriority::Automatic,
        delay_ms: None,
        limit: 0,
    }
}

#[test]
fn test_submit_script_snapshot() {
    let manager = EventManager::new(Arc::new(ManualClock::new(1_000)));
    let snapshot = submit_script(&manager, submission("s", "puts hi")).unwrap();
    assert_eq!(snapshot.name, "s");
    assert_eq!(snapshot.created_at_ms, 1_000);
    assert_eq!(snapshot.script.as_deref(), Some("puts hi"));
    assert_eq!(snapshot.state, EventState::Queued);
    assert!(snapshot.flags.contains(EventFlags::SCRIPT | EventFlags::QUEUED));
    assert!(snapshot.has_callback);
}

#[test]
fn test_submit_script_reports_queue_position() {
    let manager = EventManager::new(Arc::new(ManualClock::new(1_000)));
    assert_eq!(submit_script(&manager, submission("first", "a")).unwrap().index, 0);

    let mut urgent = submission("urgent", "b");
    urgent.flags = EventFlags::IMMEDIATE;
    assert_eq!(submit_script(&manager, urgent).unwrap().index, 0);
    assert_eq!(submit_script(&manager, submission("last", "c")).unwrap().index, 2);

    let mut idle = submission("idle", "d");
    idle.flags = EventFlags::IDLE;
    let snapshot = submit_script(&manager, idle).unwrap();
    assert!(snapshot.idle);
    assert_eq!(snapshot.index, 0);
}

#[test]
fn test_submission_deserializes_with_defaults() {
    let sub: ScriptSubmission =
        serde_json::from_str(r#"{ "name": "n", "script": "x" }"#).unwrap();
    assert_eq!(sub.priority, EventPriority::Automatic);
    assert_eq!(sub.delay_ms, None);
    assert!(sub.flags.is_empty());
}

#[test]
fn test_delayed_submission_waits_for_clock() {
    let clock = Arc::new(ManualClock::new(1_000));
    let manager = EventManager::new(clock.clone());
    let ctx = HostContext::new("delay").with_evaluator(|_, _| {
        prometheus_event_manager::core::EventOutcome::ok()
    });
    let mut sub = submission("later", "x");
    sub.delay_ms = Some(500);
    submit_script(&manager, sub).unwrap();

    assert_eq!(manager.process_events(&ctx, &DispatchOptions::default()), Ok(0));
    clock.advance(500);
    assert_eq!(manager.process_events(&ctx, &DispatchOptions::default()), Ok(1));
}

#[test]
fn test_dump_and_health() {
    let manager = EventManager::new(Arc::new(ManualClock::new(42)));
    submit_script(&manager, submission("n", "a")).unwrap();
    let mut idle = submission("i", "b");
    idle.flags = EventFlags::IDLE;
    submit_script(&manager, idle).unwrap();

    let dump = dump_manager(&manager).unwrap();
    assert_eq!(dump.taken_at_ms, 42);
    assert_eq!(dump.normal.len(), 1);
    assert_eq!(dump.idle.len(), 1);
    assert_eq!(dump.stats.total_idle, 1);
    let json = serde_json::to_string(&dump).unwrap();
    assert!(json.contains("\"name\":\"i\""));

    assert!(health(&manager).ok);
    manager.dispose();
    let h = health(&manager);
    assert!(!h.ok);
    assert!(!h.enabled);
    assert!(dump_manager(&manager).is_err());
}
