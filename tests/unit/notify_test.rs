//! Tests for queue notifications

use std::sync::Arc;

use prometheus_event_manager::core::{
    EventManager, EventOutcome, EventRequest, InMemoryNotifier, NotifyKind,
};
use prometheus_event_manager::util::EventFlags;

#[test]
fn test_notifications_for_queue_operations() {
    let sink = Arc::new(InMemoryNotifier::new(32));
    let manager = EventManager::default().with_notifier(sink.clone());

    let record = manager
        .enqueue(EventRequest::new("a", |_ctx, _payload| EventOutcome::ok()))
        .unwrap();
    manager
        .enqueue(
            EventRequest::new("b", |_ctx, _payload| EventOutcome::ok())
                .with_flags(EventFlags::IDLE),
        )
        .unwrap();
    manager.cancel("a", true, false).unwrap();
    manager.discard(true).unwrap();
    manager.clear().unwrap();

    let events = sink.events();
    let kinds: Vec<_> = events.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotifyKind::Queued,
            NotifyKind::Queued,
            NotifyKind::Canceled,
            NotifyKind::Discarded,
            NotifyKind::Cleared,
        ]
    );
    assert_eq!(events[0].event_id, Some(record.id()));
    assert!(events[1].idle);
    assert!(events[3].idle);
    assert_eq!(events[4].name, None);
}
