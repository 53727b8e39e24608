//! Event records: one schedulable unit of callback work.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{EventError, RuntimeContext};
use crate::util::serde::{EventFlags, EventPriority, ReturnCode};

/// When an event becomes eligible for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTime {
    /// Ready as soon as it is queued; sorts ahead of every timed event.
    Immediate,
    /// Ready once the clock reaches this many milliseconds since the epoch.
    At(u128),
}

impl ScheduleTime {
    /// Time component of the sort key.
    #[must_use]
    pub const fn sort_ms(self) -> u128 {
        match self {
            Self::Immediate => 0,
            Self::At(ms) => ms,
        }
    }
}

/// Thread affinity requested for an event or a dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadTarget {
    /// Not bound to a thread.
    #[default]
    Any,
    /// Bound to whichever thread makes the call.
    Current,
    /// Bound to a specific thread.
    Specific(ThreadId),
}

/// Opaque data handed to the callback.
#[derive(Clone, Default)]
pub enum EventPayload {
    /// No payload.
    #[default]
    Empty,
    /// Script text evaluated by the runtime context.
    Script(String),
    /// Arbitrary host data.
    Data(Arc<dyn Any + Send + Sync>),
}

impl EventPayload {
    /// Script text, if this is a script payload.
    #[must_use]
    pub fn script_text(&self) -> Option<&str> {
        match self {
            Self::Script(text) => Some(text),
            _ => None,
        }
    }

    /// Downcast host data.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Data(data) => data.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Script(text) => f.debug_tuple("Script").field(text).finish(),
            Self::Data(_) => f.write_str("Data(..)"),
        }
    }
}

/// Code and result text produced by a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    /// Completion code.
    pub code: ReturnCode,
    /// Result text (error message on failure).
    pub value: Option<String>,
}

impl EventOutcome {
    /// Successful outcome with no result.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: ReturnCode::Ok,
            value: None,
        }
    }

    /// Successful outcome carrying a result.
    pub fn ok_with(value: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::Ok,
            value: Some(value.into()),
        }
    }

    /// Failed outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::Error,
            value: Some(message.into()),
        }
    }

    /// Bare completion code.
    #[must_use]
    pub const fn code(code: ReturnCode) -> Self {
        Self { code, value: None }
    }

    /// Convert into the dispatcher's error type.
    #[must_use]
    pub fn to_error(&self) -> EventError {
        EventError::callback(self.code, self.value.clone().unwrap_or_default())
    }
}

/// Work performed when an event is dispatched.
///
/// Closures with the matching signature implement this automatically.
pub trait EventCallback: Send + Sync {
    /// Run the callback for `payload` inside the runtime context.
    fn invoke(&self, ctx: &dyn RuntimeContext, payload: &EventPayload) -> EventOutcome;
}

impl<F> EventCallback for F
where
    F: Fn(&dyn RuntimeContext, &EventPayload) -> EventOutcome + Send + Sync,
{
    fn invoke(&self, ctx: &dyn RuntimeContext, payload: &EventPayload) -> EventOutcome {
        self(ctx, payload)
    }
}

/// Lifecycle of a record. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Waiting in a queue.
    Queued,
    /// Taken by a dispatcher.
    Dequeued,
    /// Callback ran (successfully or not).
    Completed,
    /// Removed without running.
    Discarded,
    /// Canceled by name or script.
    Canceled,
}

impl EventState {
    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Discarded | Self::Canceled)
    }
}

/// Everything needed to queue an event.
///
/// ```
/// use prometheus_event_manager::core::{EventOutcome, EventRequest};
/// use prometheus_event_manager::util::EventFlags;
///
/// let request = EventRequest::new("tick", |_ctx, _payload| EventOutcome::ok())
///     .with_flags(EventFlags::AFTER)
///     .with_limit(16);
/// assert_eq!(request.name(), "tick");
/// ```
#[derive(Clone)]
pub struct EventRequest {
    pub(crate) name: String,
    pub(crate) when: Option<ScheduleTime>,
    pub(crate) callback: Option<Arc<dyn EventCallback>>,
    pub(crate) payload: EventPayload,
    pub(crate) flags: EventFlags,
    pub(crate) priority: EventPriority,
    pub(crate) thread: ThreadTarget,
    pub(crate) limit: usize,
}

impl EventRequest {
    /// Request running `callback`, due now.
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&dyn RuntimeContext, &EventPayload) -> EventOutcome + Send + Sync + 'static,
    {
        Self::with_callback(name, Arc::new(callback))
    }

    /// Request running a shared callback.
    pub fn with_callback(name: impl Into<String>, callback: Arc<dyn EventCallback>) -> Self {
        Self {
            callback: Some(callback),
            ..Self::without_callback(name)
        }
    }

    /// Request with no callback; the dispatcher drops it without counting it.
    pub fn without_callback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: None,
            callback: None,
            payload: EventPayload::Empty,
            flags: EventFlags::empty(),
            priority: EventPriority::Automatic,
            thread: ThreadTarget::Any,
            limit: 0,
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Due at an absolute time in milliseconds since the epoch.
    #[must_use]
    pub const fn at(mut self, when_ms: u128) -> Self {
        self.when = Some(ScheduleTime::At(when_ms));
        self
    }

    /// Due immediately, ahead of every timed event of the same priority.
    #[must_use]
    pub const fn immediate(mut self) -> Self {
        self.when = Some(ScheduleTime::Immediate);
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Attach host data.
    #[must_use]
    pub fn with_data<T: Any + Send + Sync>(self, data: T) -> Self {
        self.with_payload(EventPayload::Data(Arc::new(data)))
    }

    /// Add flags.
    #[must_use]
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Set an explicit priority instead of resolving it from the flags.
    #[must_use]
    pub const fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set thread affinity.
    #[must_use]
    pub const fn on_thread(mut self, thread: ThreadTarget) -> Self {
        self.thread = thread;
        self
    }

    /// Reject the enqueue when the target queue already holds `limit` records.
    /// Zero means unbounded.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl fmt::Debug for EventRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRequest")
            .field("name", &self.name)
            .field("when", &self.when)
            .field("has_callback", &self.callback.is_some())
            .field("payload", &self.payload)
            .field("flags", &self.flags)
            .field("priority", &self.priority)
            .field("thread", &self.thread)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Mutable part of a record, guarded by its own lock.
struct RecordSlot {
    callback: Option<Arc<dyn EventCallback>>,
    payload: EventPayload,
    state: EventState,
    outcome: Option<EventOutcome>,
    disposed: bool,
}

/// One queued unit of work.
///
/// The immutable header (identity, sort key, affinity, flags) is fixed at
/// enqueue time. The slot holds the callback, the payload, the lifecycle
/// state, and the published outcome; a condvar wakes synchronous waiters once
/// the outcome is known.
pub struct EventRecord {
    id: Uuid,
    name: String,
    sequence: u64,
    created_at_ms: u128,
    priority: EventPriority,
    when: ScheduleTime,
    thread: Option<ThreadId>,
    flags: EventFlags,
    slot: Mutex<RecordSlot>,
    done: Condvar,
}

impl EventRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        sequence: u64,
        created_at_ms: u128,
        priority: EventPriority,
        when: ScheduleTime,
        thread: Option<ThreadId>,
        flags: EventFlags,
        callback: Option<Arc<dyn EventCallback>>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            sequence,
            created_at_ms,
            priority,
            when,
            thread,
            flags,
            slot: Mutex::new(RecordSlot {
                callback,
                payload,
                state: EventState::Queued,
                outcome: None,
                disposed: false,
            }),
            done: Condvar::new(),
        }
    }

    /// Unique identity.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Name given at enqueue time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arrival sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Creation timestamp in milliseconds since the epoch.
    #[must_use]
    pub const fn created_at_ms(&self) -> u128 {
        self.created_at_ms
    }

    /// Resolved priority; never `Automatic`.
    #[must_use]
    pub const fn priority(&self) -> EventPriority {
        self.priority
    }

    /// Scheduled time.
    #[must_use]
    pub const fn when(&self) -> ScheduleTime {
        self.when
    }

    /// Bound thread, if any.
    #[must_use]
    pub const fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    /// Flags, including `QUEUED`.
    #[must_use]
    pub const fn flags(&self) -> EventFlags {
        self.flags
    }

    /// Composite sort key: priority, then time, then arrival.
    #[must_use]
    pub const fn sort_key(&self) -> (u8, u128, u64) {
        (self.priority.rank(), self.when.sort_ms(), self.sequence)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EventState {
        self.slot.lock().state
    }

    /// Whether the callback and payload have been released.
    pub fn is_disposed(&self) -> bool {
        self.slot.lock().disposed
    }

    /// Callback, unless the record has none or was disposed.
    pub fn callback(&self) -> Option<Arc<dyn EventCallback>> {
        self.slot.lock().callback.clone()
    }

    /// Payload (cheap clone; host data is shared).
    pub fn payload(&self) -> EventPayload {
        self.slot.lock().payload.clone()
    }

    /// Script text of a script event.
    pub fn script_text(&self) -> Option<String> {
        self.slot.lock().payload.script_text().map(str::to_owned)
    }

    fn transition(&self, from: &[EventState], to: EventState) -> bool {
        let mut slot = self.slot.lock();
        if !from.contains(&slot.state) {
            return false;
        }
        slot.state = to;
        if to == EventState::Discarded || to == EventState::Canceled {
            self.done.notify_all();
        }
        true
    }

    /// Queued → Dequeued.
    pub fn mark_dequeued(&self) -> bool {
        self.transition(&[EventState::Queued], EventState::Dequeued)
    }

    /// Queued/Dequeued → Completed.
    pub fn mark_completed(&self) -> bool {
        self.transition(
            &[EventState::Queued, EventState::Dequeued],
            EventState::Completed,
        )
    }

    /// Queued/Dequeued → Discarded.
    pub fn mark_dequeued_and_discarded(&self) -> bool {
        self.transition(
            &[EventState::Queued, EventState::Dequeued],
            EventState::Discarded,
        )
    }

    /// Queued/Dequeued → Canceled.
    pub fn mark_dequeued_and_canceled(&self) -> bool {
        self.transition(
            &[EventState::Queued, EventState::Dequeued],
            EventState::Canceled,
        )
    }

    /// Publish the callback outcome and wake synchronous waiters.
    pub fn set_result(&self, outcome: EventOutcome) {
        let mut slot = self.slot.lock();
        slot.outcome = Some(outcome);
        self.done.notify_all();
    }

    /// Outcome, if the callback has run.
    pub fn result(&self) -> Option<EventOutcome> {
        self.slot.lock().outcome.clone()
    }

    /// Block until the outcome is published. `None` waits forever.
    ///
    /// # Errors
    ///
    /// - `EventError::Timeout` if the outcome is not published in time
    /// - `EventError::Canceled` if the record was discarded or canceled
    pub fn wait_result(&self, timeout: Option<Duration>) -> Result<EventOutcome, EventError> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.outcome.clone() {
                return Ok(outcome);
            }
            if matches!(slot.state, EventState::Discarded | EventState::Canceled) {
                return Err(EventError::Canceled(format!(
                    "event \"{}\" was {:?}",
                    self.name, slot.state
                )));
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut slot, deadline).timed_out() {
                        return slot.outcome.clone().ok_or(EventError::Timeout);
                    }
                }
                None => self.done.wait(&mut slot),
            }
        }
    }

    /// Release the callback and payload. Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.disposed {
            return false;
        }
        slot.callback = None;
        slot.payload = EventPayload::Empty;
        slot.disposed = true;
        true
    }

    /// Dispose only when the record or the ambient flags are fire-and-forget.
    pub fn maybe_dispose(&self, ambient: EventFlags) -> bool {
        let fire_and_forget = ambient.contains(EventFlags::FIRE_AND_FORGET)
            || self.flags.contains(EventFlags::FIRE_AND_FORGET);
        fire_and_forget && self.dispose()
    }

    /// Serializable description of this record at queue position `index`.
    pub fn to_snapshot(&self, index: usize, idle: bool) -> EventSnapshot {
        let slot = self.slot.lock();
        EventSnapshot {
            index,
            idle,
            id: self.id,
            name: self.name.clone(),
            sequence: self.sequence,
            created_at_ms: self.created_at_ms,
            priority: self.priority,
            flags: self.flags,
            when: self.when,
            thread: self.thread.map(|t| format!("{t:?}")),
            state: slot.state,
            script: slot.payload.script_text().map(str::to_owned),
            has_callback: slot.callback.is_some(),
        }
    }
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .field("when", &self.when)
            .field("thread", &self.thread)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Point-in-time description of a queued record, used by dump and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Position within its queue.
    pub index: usize,
    /// Lives in the idle queue.
    pub idle: bool,
    /// Record identity.
    pub id: Uuid,
    /// Record name.
    pub name: String,
    /// Arrival sequence.
    pub sequence: u64,
    /// Enqueue time (ms, manager clock).
    pub created_at_ms: u128,
    /// Resolved priority.
    pub priority: EventPriority,
    /// Flags.
    pub flags: EventFlags,
    /// Scheduled time.
    pub when: ScheduleTime,
    /// Bound thread, formatted.
    pub thread: Option<String>,
    /// Lifecycle state.
    pub state: EventState,
    /// Script text for script events.
    pub script: Option<String>,
    /// Whether a callback is attached.
    pub has_callback: bool,
}
