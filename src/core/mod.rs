//! Core scheduling: event records, readiness rules, the manager, dispatch,
//! and waits.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod event_manager;
pub mod notify;
pub mod readiness;
pub mod wait;

pub use context::{BackgroundErrorPolicy, HostContext, RuntimeContext, ScriptEvaluator};
pub use dispatch::DispatchOptions;
pub use error::{AppResult, EventError};
pub use event::{
    EventCallback, EventOutcome, EventPayload, EventRecord, EventRequest, EventSnapshot,
    EventState, ScheduleTime, ThreadTarget,
};
pub use event_manager::{EventManager, EventStats, DEFAULT_SLEEP_TIME_MS, MINIMUM_SLEEP_TIME_MS};
pub use notify::{build_notification, EventNotifier, InMemoryNotifier, Notification, NotifyKind};
pub use readiness::{ReadyQuery, ScanVerdict};
