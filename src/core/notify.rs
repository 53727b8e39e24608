//! Notification sinks for queue activity.
//!
//! Hosts attach an [`EventNotifier`] to observe enqueue, cancel, and clear
//! operations. The in-memory sink keeps a bounded history for tests and tools.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::now_ms;

/// What happened to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// A record was queued.
    Queued,
    /// A record was canceled.
    Canceled,
    /// A record was discarded.
    Discarded,
    /// Both queues were cleared.
    Cleared,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Canceled => "canceled",
            Self::Discarded => "discarded",
            Self::Cleared => "cleared",
        };
        f.write_str(name)
    }
}

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub kind: NotifyKind,
    /// Record identity, absent for whole-queue operations.
    pub event_id: Option<Uuid>,
    /// Record name, absent for whole-queue operations.
    pub name: Option<String>,
    /// Whether the record lives in the idle queue.
    pub idle: bool,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Receives queue notifications. Called with the manager lock released.
pub trait EventNotifier: Send + Sync {
    /// Record one notification.
    fn notify(&self, notification: Notification);
}

/// Bounded in-memory notifier.
#[derive(Debug)]
pub struct InMemoryNotifier {
    events: Mutex<VecDeque<Notification>>,
    max_events: usize,
}

impl InMemoryNotifier {
    /// Create a notifier keeping at most `max_events` entries.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Snapshot of stored notifications, oldest first.
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored notifications of one kind.
    pub fn count(&self, kind: NotifyKind) -> usize {
        self.events.lock().iter().filter(|n| n.kind == kind).count()
    }
}

impl EventNotifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) {
        let mut events = self.events.lock();
        if self.max_events == 0 {
            return;
        }
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(notification);
    }
}

/// Build a notification stamped with the current time.
pub fn build_notification(
    kind: NotifyKind,
    event_id: Option<Uuid>,
    name: Option<String>,
    idle: bool,
) -> Notification {
    Notification {
        kind,
        event_id,
        name,
        idle,
        created_at_ms: now_ms(),
    }
}
