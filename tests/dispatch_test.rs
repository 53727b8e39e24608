//! Integration tests for the dispatch loop: error aggregation, completion
//! codes, panics, script events, and the blocking service loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use prometheus_event_manager::core::{
    BackgroundErrorPolicy, DispatchOptions, EventError, EventManager, EventOutcome,
    EventRequest, EventState, HostContext, RuntimeContext,
};
use prometheus_event_manager::util::{EventFlags, ReturnCode, SleepType};

fn returning(name: &str, outcome: EventOutcome) -> EventRequest {
    EventRequest::new(name, move |_ctx, _payload| outcome.clone())
}

#[test]
fn test_ok_err_ok_aggregates_single_error() {
    let manager = EventManager::default();
    let ctx = HostContext::new("agg");
    let first = manager.enqueue(returning("a", EventOutcome::ok())).unwrap();
    manager
        .enqueue(returning("b", EventOutcome::error("bad b")))
        .unwrap();
    let third = manager.enqueue(returning("c", EventOutcome::ok())).unwrap();

    let err = manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    match err {
        EventError::Aggregate { processed, errors } => {
            assert_eq!(processed, 3);
            assert_eq!(errors, vec![EventError::callback(ReturnCode::Error, "bad b")]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(first.state(), EventState::Completed);
    assert_eq!(third.state(), EventState::Completed);
    assert_eq!(ctx.background_errors().len(), 1);
    assert_eq!(manager.stats().total_processed, 3);
}

#[test]
fn test_stop_on_error() {
    let manager = EventManager::default();
    let ctx = HostContext::new("stop");
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();
    manager
        .enqueue(returning("b", EventOutcome::error("bad")))
        .unwrap();
    manager.enqueue(returning("c", EventOutcome::ok())).unwrap();

    let options = DispatchOptions::default().stop_on_error(true);
    let err = manager.process_events(&ctx, &options).unwrap_err();
    assert!(matches!(err, EventError::Aggregate { processed: 2, .. }));
    assert_eq!(manager.list(None).unwrap(), vec!["c"]);
}

#[test]
fn test_background_policy_can_stop() {
    let manager = EventManager::default();
    let ctx = HostContext::new("policy").with_policy(BackgroundErrorPolicy::Stop);
    manager
        .enqueue(returning("a", EventOutcome::error("bad")))
        .unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();

    assert!(manager
        .process_events(&ctx, &DispatchOptions::default())
        .is_err());
    assert_eq!(manager.list(None).unwrap(), vec!["b"]);
}

#[test]
fn test_no_bg_error_skips_policy() {
    let manager = EventManager::default();
    let ctx = HostContext::new("quiet").with_policy(BackgroundErrorPolicy::Stop);
    manager
        .enqueue(returning("a", EventOutcome::error("bad")).with_flags(EventFlags::NO_BG_ERROR))
        .unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();

    let err = manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    assert!(matches!(err, EventError::Aggregate { processed: 2, .. }));
    assert!(ctx.background_errors().is_empty());
}

#[test]
fn test_break_stops_with_error() {
    let manager = EventManager::default();
    let ctx = HostContext::new("break");
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();
    manager
        .enqueue(returning("b", EventOutcome::code(ReturnCode::Break)))
        .unwrap();
    manager.enqueue(returning("c", EventOutcome::ok())).unwrap();

    let err = manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        EventError::Aggregate {
            processed: 2,
            errors: vec![EventError::callback(ReturnCode::Break, "")],
        }
    );
    assert_eq!(manager.len(false).unwrap(), 1);
    assert!(ctx.background_errors().is_empty());
}

#[test]
fn test_return_stops_with_success() {
    let manager = EventManager::default();
    let ctx = HostContext::new("return");
    manager
        .enqueue(returning("a", EventOutcome::code(ReturnCode::Return)))
        .unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();

    assert_eq!(
        manager.process_events(&ctx, &DispatchOptions::default()),
        Ok(1)
    );
    assert_eq!(manager.len(false).unwrap(), 1);
}

#[test]
fn test_continue_keeps_going() {
    let manager = EventManager::default();
    let ctx = HostContext::new("continue");
    manager
        .enqueue(returning("a", EventOutcome::code(ReturnCode::Continue)))
        .unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();
    assert_eq!(
        manager.process_events(&ctx, &DispatchOptions::default()),
        Ok(2)
    );
}

#[test]
fn test_panic_becomes_callback_failure() {
    let manager = EventManager::default();
    let ctx = HostContext::new("panic");
    let record = manager
        .enqueue(EventRequest::new("boom", |_ctx, _payload| -> EventOutcome {
            panic!("kaboom")
        }))
        .unwrap();
    manager.enqueue(returning("after", EventOutcome::ok())).unwrap();

    let err = manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    assert_eq!(
        err.errors(),
        &[EventError::callback(ReturnCode::Error, "callback panicked: kaboom")]
    );
    assert_eq!(record.state(), EventState::Completed);
    assert_eq!(record.result().unwrap().code, ReturnCode::Error);
    assert!(manager.is_empty(false).unwrap());
    assert_eq!(manager.levels(), 0);
}

#[test]
fn test_error_on_empty_appends_exhausted() {
    let manager = EventManager::default();
    let ctx = HostContext::new("empty");
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();

    let options = DispatchOptions::default().error_on_empty(true);
    let err = manager.process_events(&ctx, &options).unwrap_err();
    assert_eq!(err.errors(), &[EventError::Exhausted { processed: 1 }]);
    assert_eq!(
        err.errors()[0].to_string(),
        "no more events are ready, processed: 1"
    );
}

#[test]
fn test_error_on_empty_when_limit_drains_queue() {
    let manager = EventManager::default();
    let ctx = HostContext::new("limit-drain");
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();

    let options = DispatchOptions::default().with_limit(2).error_on_empty(true);
    let err = manager.process_events(&ctx, &options).unwrap_err();
    assert!(manager.is_empty(false).unwrap());
    assert_eq!(
        err,
        EventError::Aggregate {
            processed: 2,
            errors: vec![EventError::Exhausted { processed: 2 }],
        }
    );
}

#[test]
fn test_error_on_empty_quiet_while_work_remains() {
    let manager = EventManager::default();
    let ctx = HostContext::new("limit-left");
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();
    manager.enqueue(returning("b", EventOutcome::ok())).unwrap();

    let options = DispatchOptions::default().with_limit(1).error_on_empty(true);
    assert_eq!(manager.process_events(&ctx, &options), Ok(1));
    assert_eq!(manager.len(false).unwrap(), 1);
}

#[test]
fn test_error_on_empty_after_return_drains_queue() {
    let manager = EventManager::default();
    let ctx = HostContext::new("return-drain");
    manager
        .enqueue(returning("only", EventOutcome::code(ReturnCode::Return)))
        .unwrap();

    let options = DispatchOptions::default().error_on_empty(true);
    let err = manager.process_events(&ctx, &options).unwrap_err();
    assert_eq!(err.errors(), &[EventError::Exhausted { processed: 1 }]);
}

#[test]
fn test_callbackless_record_is_not_counted() {
    let manager = EventManager::default();
    let ctx = HostContext::new("bare");
    let ghost = manager
        .enqueue(EventRequest::without_callback("ghost"))
        .unwrap();
    assert_eq!(
        manager.process_events(&ctx, &DispatchOptions::default()),
        Ok(0)
    );
    assert!(manager.is_empty(false).unwrap());
    assert_eq!(manager.stats().maybe_disposed, 1);

    // nothing will ever run it, so result waiters are released
    assert_eq!(ghost.state(), EventState::Discarded);
    assert!(matches!(
        ghost.wait_result(None),
        Err(EventError::Canceled(_))
    ));
}

#[test]
fn test_ambient_fire_and_forget_disposes() {
    let manager = EventManager::default();
    let ctx = HostContext::new("faf");
    let record = manager
        .enqueue(returning("a", EventOutcome::ok_with("value")))
        .unwrap();
    let options =
        DispatchOptions::default().with_flags(EventFlags::SERVICE | EventFlags::FIRE_AND_FORGET);
    assert_eq!(manager.process_events(&ctx, &options), Ok(1));
    assert!(record.is_disposed());
    assert!(record.callback().is_none());
    // the outcome survives disposal
    assert_eq!(record.result().unwrap().value.as_deref(), Some("value"));
    assert_eq!(manager.stats().really_disposed, 1);
}

#[test]
fn test_result_waiter_on_other_thread() {
    let manager = Arc::new(EventManager::default());
    let ctx = HostContext::new("waiter");
    let record = manager
        .enqueue(returning("answer", EventOutcome::ok_with("42")))
        .unwrap();

    let waiting = Arc::clone(&record);
    let handle = thread::spawn(move || waiting.wait_result(Some(Duration::from_secs(5))));
    thread::sleep(Duration::from_millis(20));
    manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap();
    let outcome = handle.join().unwrap().unwrap();
    assert_eq!(outcome.value.as_deref(), Some("42"));
}

#[test]
fn test_script_events_use_context_evaluator() {
    let manager = EventManager::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_ctx = Arc::clone(&seen);
    let ctx = HostContext::new("interp").with_evaluator(move |text, flags| {
        seen_by_ctx.lock().push((text.to_string(), flags.contains(EventFlags::DEBUG)));
        EventOutcome::ok_with(text.to_uppercase())
    });
    let record = manager
        .enqueue_script(
            "set x 1",
            EventRequest::without_callback("script").with_flags(EventFlags::DEBUG),
        )
        .unwrap();
    assert!(record.flags().contains(EventFlags::SCRIPT));

    assert_eq!(
        manager.process_events(&ctx, &DispatchOptions::default()),
        Ok(1)
    );
    assert_eq!(record.result().unwrap().value.as_deref(), Some("SET X 1"));
    assert_eq!(seen.lock().clone(), vec![("set x 1".to_string(), true)]);
}

#[test]
fn test_script_event_without_evaluator_fails() {
    let manager = EventManager::default();
    let ctx = HostContext::new("plain");
    manager
        .enqueue_script("exit", EventRequest::without_callback("script"))
        .unwrap();
    let err = manager
        .process_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    assert!(matches!(
        err.errors()[0],
        EventError::CallbackFailure { code: ReturnCode::Error, .. }
    ));
}

#[test]
fn test_callback_can_enqueue_reentrantly() {
    let manager = Arc::new(EventManager::default());
    let ctx = HostContext::new("nested");
    let inner = Arc::clone(&manager);
    manager
        .enqueue(EventRequest::new("parent", move |_ctx, _payload| {
            let active = inner.is_active();
            match inner.enqueue(returning("child", EventOutcome::ok())) {
                Ok(_) if active => EventOutcome::ok(),
                Ok(_) => EventOutcome::error("dispatcher not active"),
                Err(err) => EventOutcome::error(err.to_string()),
            }
        }))
        .unwrap();

    assert_eq!(
        manager.process_events(&ctx, &DispatchOptions::default()),
        Ok(2)
    );
    assert!(!manager.is_active());
}

struct PumpCounter {
    pumps: AtomicUsize,
}

impl RuntimeContext for PumpCounter {
    fn pump_user_interface(&self) -> Result<(), EventError> {
        self.pumps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_do_one_pass_pumps_user_interface() {
    let manager = EventManager::default();
    let ctx = PumpCounter {
        pumps: AtomicUsize::new(0),
    };
    manager.enqueue(returning("a", EventOutcome::ok())).unwrap();

    assert_eq!(manager.do_one_pass(&ctx, &DispatchOptions::default()), Ok(1));
    assert_eq!(ctx.pumps.load(Ordering::SeqCst), 0);
    let options = DispatchOptions::default().user_interface(true);
    assert_eq!(manager.do_one_pass(&ctx, &options), Ok(0));
    assert_eq!(ctx.pumps.load(Ordering::SeqCst), 1);
}

#[test]
fn test_service_loop_exits_on_cancel() {
    let manager = Arc::new(EventManager::default());
    manager.set_minimum_sleep_time(SleepType::Service, Some(5));
    let ctx = Arc::new(HostContext::new("service"));
    for i in 0..3 {
        manager
            .enqueue(returning(&format!("e{i}"), EventOutcome::ok()))
            .unwrap();
    }

    let loop_manager = Arc::clone(&manager);
    let loop_ctx = Arc::clone(&ctx);
    let handle = thread::spawn(move || {
        loop_manager.service_events(loop_ctx.as_ref(), &DispatchOptions::default())
    });

    thread::sleep(Duration::from_millis(50));
    manager.enqueue(returning("late", EventOutcome::ok())).unwrap();
    thread::sleep(Duration::from_millis(50));
    ctx.cancel();

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, EventError::Canceled(_)));
    assert_eq!(manager.stats().total_processed, 4);
    assert!(manager.is_empty(false).unwrap());
}

#[test]
fn test_service_loop_stops_on_teardown() {
    let manager = EventManager::default();
    let ctx = HostContext::new("gone");
    manager.dispose();
    let err = manager
        .service_events(&ctx, &DispatchOptions::default())
        .unwrap_err();
    assert!(matches!(err, EventError::NotAccepting(_)));
}
