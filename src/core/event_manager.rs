//! The event manager: two priority queues, four wait signals, counters, and
//! the sleep-time table, all behind one lock.
//!
//! Queue mutation and signaling happen under a single `parking_lot::Mutex`;
//! callbacks and notifier calls always run after it is released, so a
//! callback may enqueue or dequeue freely. Counters are lock-free atomics read
//! through [`EventManager::stats`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::event::{EventRecord, EventRequest, EventSnapshot, ScheduleTime, ThreadTarget};
use crate::core::notify::{build_notification, EventNotifier, Notification, NotifyKind};
use crate::core::readiness::{self, ReadyQuery};
use crate::core::{EventError, EventOutcome, EventPayload, RuntimeContext};
use crate::infra::queue::InMemoryEventQueue;
use crate::signal::WaitSignal;
use crate::util::clock::{Clock, SystemClock};
use crate::util::serde::{EventFlags, EventPriority, SleepType};

/// Fallback sleep time when neither the table nor the manager sets one.
pub const DEFAULT_SLEEP_TIME_MS: u64 = 0;

/// Floor applied by the minimum sleep-time lookups.
pub const MINIMUM_SLEEP_TIME_MS: u64 = 50;

/// Lock-protected part of the manager. Queues are `None` after teardown.
struct ManagerState {
    normal: Option<InMemoryEventQueue>,
    idle: Option<InMemoryEventQueue>,
    sleep_times: HashMap<SleepType, u64>,
    minimum_sleep_times: HashMap<SleepType, u64>,
    default_sleep_ms: Option<u64>,
}

impl ManagerState {
    fn queue_mut(&mut self, idle: bool) -> Option<&mut InMemoryEventQueue> {
        if idle {
            self.idle.as_mut()
        } else {
            self.normal.as_mut()
        }
    }

    fn queue(&self, idle: bool) -> Option<&InMemoryEventQueue> {
        if idle {
            self.idle.as_ref()
        } else {
            self.normal.as_ref()
        }
    }

    fn both(&self) -> Result<(&InMemoryEventQueue, &InMemoryEventQueue), EventError> {
        match (self.normal.as_ref(), self.idle.as_ref()) {
            (Some(normal), Some(idle)) => Ok((normal, idle)),
            _ => Err(not_accepting("events")),
        }
    }

    fn both_mut(
        &mut self,
    ) -> Result<(&mut InMemoryEventQueue, &mut InMemoryEventQueue), EventError> {
        match (self.normal.as_mut(), self.idle.as_mut()) {
            (Some(normal), Some(idle)) => Ok((normal, idle)),
            _ => Err(not_accepting("events")),
        }
    }
}

fn not_accepting(what: &str) -> EventError {
    EventError::NotAccepting(what.to_owned())
}

const fn queue_label(idle: bool) -> &'static str {
    if idle {
        "idle"
    } else {
        "normal"
    }
}

/// The four wait conditions.
#[derive(Debug)]
pub(crate) struct Signals {
    normal_empty: WaitSignal,
    normal_enqueued: WaitSignal,
    idle_empty: WaitSignal,
    idle_enqueued: WaitSignal,
}

impl Signals {
    const fn new() -> Self {
        Self {
            normal_empty: WaitSignal::new("normal-empty"),
            normal_enqueued: WaitSignal::new("normal-enqueued"),
            idle_empty: WaitSignal::new("idle-empty"),
            idle_enqueued: WaitSignal::new("idle-enqueued"),
        }
    }

    pub(crate) const fn empty(&self, idle: bool) -> &WaitSignal {
        if idle {
            &self.idle_empty
        } else {
            &self.normal_empty
        }
    }

    pub(crate) const fn enqueued(&self, idle: bool) -> &WaitSignal {
        if idle {
            &self.idle_enqueued
        } else {
            &self.normal_enqueued
        }
    }

    fn close_all(&self) {
        for signal in [
            &self.normal_empty,
            &self.normal_enqueued,
            &self.idle_empty,
            &self.idle_enqueued,
        ] {
            signal.close();
        }
    }
}

/// Lock-free counters.
#[derive(Debug, Default)]
pub(crate) struct ManagerCounters {
    normal_depth: AtomicU64,
    max_normal_depth: AtomicU64,
    idle_depth: AtomicU64,
    max_idle_depth: AtomicU64,
    total_normal: AtomicU64,
    total_idle: AtomicU64,
    maybe_disposed: AtomicU64,
    really_disposed: AtomicU64,
    pub(crate) total_processed: AtomicU64,
    pub(crate) empty_wait_attempts: AtomicU64,
    pub(crate) empty_wait_errors: AtomicU64,
    pub(crate) enqueued_wait_attempts: AtomicU64,
    pub(crate) enqueued_wait_errors: AtomicU64,
    pub(crate) levels: AtomicU64,
}

impl ManagerCounters {
    const fn depth(&self, idle: bool) -> (&AtomicU64, &AtomicU64) {
        if idle {
            (&self.idle_depth, &self.max_idle_depth)
        } else {
            (&self.normal_depth, &self.max_normal_depth)
        }
    }

    fn reset(&self) {
        for counter in [
            &self.normal_depth,
            &self.max_normal_depth,
            &self.idle_depth,
            &self.max_idle_depth,
            &self.total_normal,
            &self.total_idle,
            &self.maybe_disposed,
            &self.really_disposed,
            &self.total_processed,
            &self.empty_wait_attempts,
            &self.empty_wait_errors,
            &self.enqueued_wait_attempts,
            &self.enqueued_wait_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, enabled: bool, disposed: bool) -> EventStats {
        EventStats {
            normal_depth: self.normal_depth.load(Ordering::Relaxed),
            max_normal_depth: self.max_normal_depth.load(Ordering::Relaxed),
            idle_depth: self.idle_depth.load(Ordering::Relaxed),
            max_idle_depth: self.max_idle_depth.load(Ordering::Relaxed),
            total_normal: self.total_normal.load(Ordering::Relaxed),
            total_idle: self.total_idle.load(Ordering::Relaxed),
            maybe_disposed: self.maybe_disposed.load(Ordering::Relaxed),
            really_disposed: self.really_disposed.load(Ordering::Relaxed),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            empty_wait_attempts: self.empty_wait_attempts.load(Ordering::Relaxed),
            empty_wait_errors: self.empty_wait_errors.load(Ordering::Relaxed),
            enqueued_wait_attempts: self.enqueued_wait_attempts.load(Ordering::Relaxed),
            enqueued_wait_errors: self.enqueued_wait_errors.load(Ordering::Relaxed),
            levels: self.levels.load(Ordering::Relaxed),
            enabled,
            disposed,
        }
    }
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventStats {
    /// Records in the normal queue.
    pub normal_depth: u64,
    /// High-water mark of the normal queue.
    pub max_normal_depth: u64,
    /// Records in the idle queue.
    pub idle_depth: u64,
    /// High-water mark of the idle queue.
    pub max_idle_depth: u64,
    /// Records ever queued as normal.
    pub total_normal: u64,
    /// Records ever queued as idle.
    pub total_idle: u64,
    /// Records passed through maybe-dispose.
    pub maybe_disposed: u64,
    /// Records actually disposed.
    pub really_disposed: u64,
    /// Callbacks invoked by the dispatcher.
    pub total_processed: u64,
    /// Calls to `wait_for_empty_queue`.
    pub empty_wait_attempts: u64,
    /// Failed calls to `wait_for_empty_queue`.
    pub empty_wait_errors: u64,
    /// Calls to `wait_for_event_enqueued`.
    pub enqueued_wait_attempts: u64,
    /// Failed calls to `wait_for_event_enqueued`.
    pub enqueued_wait_errors: u64,
    /// Current dispatch nesting depth.
    pub levels: u64,
    /// Whether dispatch is enabled.
    pub enabled: bool,
    /// Whether the manager was torn down.
    pub disposed: bool,
}

/// Priority-ordered, idle-aware, thread-affinity-aware event scheduler.
///
/// ```
/// use prometheus_event_manager::core::{EventManager, EventOutcome, EventRequest};
/// use prometheus_event_manager::util::{EventFlags, EventPriority};
/// use prometheus_event_manager::core::ThreadTarget;
///
/// let manager = EventManager::default();
/// manager
///     .enqueue(EventRequest::new("hello", |_ctx, _payload| EventOutcome::ok()))
///     .unwrap();
/// let record = manager
///     .dequeue_ready(u128::MAX, EventFlags::empty(), EventPriority::Automatic, ThreadTarget::Any, true)
///     .unwrap()
///     .unwrap();
/// assert_eq!(record.name(), "hello");
/// ```
pub struct EventManager {
    state: Mutex<ManagerState>,
    signals: Signals,
    pub(crate) counters: ManagerCounters,
    sequence: AtomicU64,
    enabled: AtomicBool,
    no_notify: AtomicBool,
    disposed: AtomicBool,
    default_limit: usize,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn EventNotifier>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("stats", &self.stats())
            .field("default_limit", &self.default_limit)
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl EventManager {
    /// Create an enabled manager reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                normal: Some(InMemoryEventQueue::new()),
                idle: Some(InMemoryEventQueue::new()),
                sleep_times: HashMap::new(),
                minimum_sleep_times: HashMap::new(),
                default_sleep_ms: None,
            }),
            signals: Signals::new(),
            counters: ManagerCounters::default(),
            sequence: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
            no_notify: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            default_limit: 0,
            clock,
            notifier: None,
        }
    }

    /// Attach a notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Limit applied to requests that do not set their own.
    #[must_use]
    pub const fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Current time according to the injected clock.
    pub fn now_ms(&self) -> u128 {
        self.clock.now_ms()
    }

    pub(crate) const fn signals(&self) -> &Signals {
        &self.signals
    }

    // ---------------------------------------------------------------------
    // enqueue
    // ---------------------------------------------------------------------

    /// Queue a request.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::LimitExceeded` when the target queue is at its limit
    pub fn enqueue(&self, request: EventRequest) -> Result<Arc<EventRecord>, EventError> {
        self.enqueue_indexed(request).map(|(record, _)| record)
    }

    /// Queue a request and report the position it landed at.
    pub(crate) fn enqueue_indexed(
        &self,
        request: EventRequest,
    ) -> Result<(Arc<EventRecord>, usize), EventError> {
        let EventRequest {
            name,
            when,
            callback,
            payload,
            flags,
            priority,
            thread,
            limit,
        } = request;
        let idle = flags.contains(EventFlags::IDLE);
        let limit = if limit > 0 { limit } else { self.default_limit };
        let priority = readiness::automatic_priority(flags, priority);
        let thread = readiness::automatic_thread(thread);
        let now = self.clock.now_ms();
        let when = when.unwrap_or(ScheduleTime::At(now));

        let (record, index) = {
            let mut state = self.state.lock();
            let queue = state
                .queue_mut(idle)
                .ok_or_else(|| not_accepting("events"))?;
            if limit > 0 && queue.len() >= limit {
                return Err(EventError::LimitExceeded(format!(
                    "{} queue",
                    queue_label(idle)
                )));
            }
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let record = Arc::new(EventRecord::new(
                name,
                sequence,
                now,
                priority,
                when,
                thread,
                flags | EventFlags::QUEUED,
                callback,
                payload,
            ));
            let index = queue.enqueue(Arc::clone(&record));
            let depth = queue.len() as u64;
            self.note_enqueued(idle, depth);
            if let Err(err) = self.signals.enqueued(idle).set() {
                warn!(error = %err, queue = queue_label(idle), "failed to signal enqueue");
            }
            (record, index)
        };

        debug!(
            event = record.name(),
            sequence = record.sequence(),
            priority = %record.priority(),
            queue = queue_label(idle),
            index,
            "event queued"
        );
        self.notify(NotifyKind::Queued, Some(&record), idle);
        Ok((record, index))
    }

    /// Queue script text for evaluation by the runtime context.
    ///
    /// The request's callback and payload are replaced.
    ///
    /// # Errors
    ///
    /// Same as [`EventManager::enqueue`].
    pub fn enqueue_script(
        &self,
        text: impl Into<String>,
        request: EventRequest,
    ) -> Result<Arc<EventRecord>, EventError> {
        self.enqueue(Self::script_request(text, request))
    }

    /// Turn `request` into a script event for `text`.
    pub(crate) fn script_request(text: impl Into<String>, request: EventRequest) -> EventRequest {
        let flags = request.flags | EventFlags::SCRIPT;
        let callback = move |ctx: &dyn RuntimeContext, payload: &EventPayload| {
            let Some(text) = payload.script_text() else {
                return EventOutcome::error("script event has no text");
            };
            if flags.contains(EventFlags::DEBUG) {
                debug!(context = ctx.name(), script = text, "evaluating script event");
            }
            let outcome = ctx.evaluate_script(text, flags);
            if flags.contains(EventFlags::DEBUG) {
                debug!(context = ctx.name(), code = %outcome.code, "script event evaluated");
            }
            outcome
        };
        EventRequest {
            callback: Some(Arc::new(callback)),
            payload: EventPayload::Script(text.into()),
            flags,
            ..request
        }
    }

    fn note_enqueued(&self, idle: bool, depth: u64) {
        let (current, max) = self.counters.depth(idle);
        current.store(depth, Ordering::Relaxed);
        if idle {
            self.counters.total_idle.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.total_normal.fetch_add(1, Ordering::Relaxed);
        }
        if depth > max.fetch_max(depth, Ordering::Relaxed) {
            debug!(queue = queue_label(idle), depth, "queue depth high-water mark");
        }
    }

    // ---------------------------------------------------------------------
    // dequeue
    // ---------------------------------------------------------------------

    /// Remove `index` from a queue, mark it dequeued, and signal the empty
    /// condition when the removal emptied the queue. Called under the lock.
    fn take_at(
        &self,
        queue: &mut InMemoryEventQueue,
        index: usize,
        idle: bool,
    ) -> Option<Arc<EventRecord>> {
        let record = queue.remove(index)?;
        record.mark_dequeued();
        self.counters
            .depth(idle)
            .0
            .store(queue.len() as u64, Ordering::Relaxed);
        if queue.is_empty() {
            if let Err(err) = self.signals.empty(idle).set() {
                warn!(error = %err, queue = queue_label(idle), "failed to signal empty queue");
            }
        }
        Some(record)
    }

    /// Take the first ready record, normal queue first.
    ///
    /// The idle queue is scanned only when the normal queue has nothing ready,
    /// the caller did not pass `NO_IDLE`, and the caller's `IDLE_IF_EMPTY` is
    /// not held back by a non-empty normal queue. Idle records flagged
    /// `IDLE_IF_EMPTY` are skipped while the normal queue holds anything.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::NoEventsReady` when `strict` and nothing is ready
    pub fn dequeue_ready(
        &self,
        now_ms: u128,
        flags: EventFlags,
        priority: EventPriority,
        thread: ThreadTarget,
        strict: bool,
    ) -> Result<Option<Arc<EventRecord>>, EventError> {
        let query = ReadyQuery::resolve(now_ms, flags, priority, thread);
        let mut state = self.state.lock();
        let (normal, idle) = state.both_mut()?;

        match locate_ready(normal, idle, &query, flags) {
            Some((false, index)) => Ok(self.take_at(normal, index, false)),
            Some((true, index)) => Ok(self.take_at(idle, index, true)),
            None if strict => Err(EventError::NoEventsReady),
            None => Ok(None),
        }
    }

    /// Whether [`Self::dequeue_ready`] with the same arguments would find a
    /// record. Nothing is removed.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn has_ready(
        &self,
        now_ms: u128,
        flags: EventFlags,
        priority: EventPriority,
        thread: ThreadTarget,
    ) -> Result<bool, EventError> {
        let query = ReadyQuery::resolve(now_ms, flags, priority, thread);
        let state = self.state.lock();
        let (normal, idle) = state.both()?;
        Ok(locate_ready(normal, idle, &query, flags).is_some())
    }

    /// Remove the head record ignoring readiness, normal queue first.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::NoEventsReady` when `strict` and both queues are empty
    pub fn dequeue_any(&self, strict: bool) -> Result<Option<Arc<EventRecord>>, EventError> {
        let mut state = self.state.lock();
        let (normal, idle) = state.both_mut()?;
        let record = if normal.is_empty() {
            self.take_at(idle, 0, true)
        } else {
            self.take_at(normal, 0, false)
        };
        match record {
            None if strict => Err(EventError::NoEventsReady),
            other => Ok(other),
        }
    }

    /// Remove the head record and discard it without running it.
    ///
    /// # Errors
    ///
    /// Same as [`EventManager::dequeue_any`].
    pub fn discard(&self, strict: bool) -> Result<Option<Arc<EventRecord>>, EventError> {
        let (record, idle) = {
            let mut state = self.state.lock();
            let (normal, idle_queue) = state.both_mut()?;
            if normal.is_empty() {
                (self.take_at(idle_queue, 0, true), true)
            } else {
                (self.take_at(normal, 0, false), false)
            }
        };
        let Some(record) = record else {
            return if strict {
                Err(EventError::NoEventsReady)
            } else {
                Ok(None)
            };
        };
        record.mark_dequeued_and_discarded();
        self.maybe_dispose(&record, EventFlags::empty());
        self.notify(NotifyKind::Discarded, Some(&record), idle);
        Ok(Some(record))
    }

    // ---------------------------------------------------------------------
    // introspection
    // ---------------------------------------------------------------------

    /// Head of the normal queue, else head of the idle queue.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::NoEventsReady` when `strict` and both queues are empty
    pub fn peek(&self, strict: bool) -> Result<Option<Arc<EventRecord>>, EventError> {
        let state = self.state.lock();
        let (normal, idle) = state.both()?;
        match normal.peek().or_else(|| idle.peek()) {
            Some(record) => Ok(Some(Arc::clone(record))),
            None if strict => Err(EventError::NoEventsReady),
            None => Ok(None),
        }
    }

    /// First queued record with this name, normal queue first.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::NotFound` when no record has the name
    pub fn find_by_name(&self, name: &str) -> Result<Arc<EventRecord>, EventError> {
        let state = self.state.lock();
        let (normal, idle) = state.both()?;
        let found = normal
            .iter()
            .chain(idle.iter())
            .find(|record| record.name() == name)
            .cloned();
        found.ok_or_else(|| EventError::NotFound(name.to_owned()))
    }

    /// Names of queued records matching a glob pattern, or all names.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::InvalidPattern` when the pattern does not parse
    pub fn list(&self, pattern: Option<&str>) -> Result<Vec<String>, EventError> {
        let pattern = pattern
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|err| EventError::InvalidPattern(err.to_string()))?;
        let state = self.state.lock();
        let (normal, idle) = state.both()?;
        Ok(normal
            .iter()
            .chain(idle.iter())
            .filter(|record| pattern.as_ref().is_none_or(|p| p.matches(record.name())))
            .map(|record| record.name().to_owned())
            .collect())
    }

    /// Queued records accepted by `predicate`. The predicate runs with the
    /// lock released; a panicking predicate counts as a non-match.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn list_matching<F>(&self, mut predicate: F) -> Result<Vec<Arc<EventRecord>>, EventError>
    where
        F: FnMut(&EventRecord) -> bool,
    {
        let records: Vec<_> = {
            let state = self.state.lock();
            let (normal, idle) = state.both()?;
            normal.iter().chain(idle.iter()).cloned().collect()
        };
        Ok(records
            .into_iter()
            .filter(|record| {
                catch_unwind(AssertUnwindSafe(|| predicate(record))).unwrap_or_else(|_| {
                    warn!(event = record.name(), "list predicate panicked");
                    false
                })
            })
            .collect())
    }

    /// Snapshot of both queues in dequeue order, normal first.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn dump(&self) -> Result<Vec<EventSnapshot>, EventError> {
        let state = self.state.lock();
        let (normal, idle) = state.both()?;
        let normal = normal
            .iter()
            .enumerate()
            .map(|(index, record)| record.to_snapshot(index, false));
        let idle = idle
            .iter()
            .enumerate()
            .map(|(index, record)| record.to_snapshot(index, true));
        Ok(normal.chain(idle).collect())
    }

    /// Number of records in one queue.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn len(&self, idle: bool) -> Result<usize, EventError> {
        self.state
            .lock()
            .queue(idle)
            .map(InMemoryEventQueue::len)
            .ok_or_else(|| not_accepting("events"))
    }

    /// Whether one queue is empty.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn is_empty(&self, idle: bool) -> Result<bool, EventError> {
        self.len(idle).map(|len| len == 0)
    }

    // ---------------------------------------------------------------------
    // management
    // ---------------------------------------------------------------------

    /// Cancel queued records by name, or by script text when no name matches.
    ///
    /// Each queue is searched from the tail. Without `all` only the first
    /// match is canceled. Returns how many records were canceled.
    ///
    /// # Errors
    ///
    /// - `EventError::NotAccepting` after teardown
    /// - `EventError::NotFound` when `strict` and nothing matched
    pub fn cancel(&self, name_or_script: &str, strict: bool, all: bool) -> Result<usize, EventError> {
        let mut canceled: Vec<(Arc<EventRecord>, bool)> = Vec::new();
        {
            let mut state = self.state.lock();
            let (normal, idle) = state.both_mut()?;
            for (queue, is_idle) in [(normal, false), (idle, true)] {
                if !all && !canceled.is_empty() {
                    break;
                }
                let mut indices = matching_indices(queue, |r| r.name() == name_or_script);
                if indices.is_empty() {
                    indices = matching_indices(queue, |r| {
                        r.script_text().as_deref() == Some(name_or_script)
                    });
                }
                if !all {
                    indices.truncate(1);
                }
                // indices are descending, so removal keeps the rest valid
                for index in indices {
                    if let Some(record) = self.take_at(queue, index, is_idle) {
                        canceled.push((record, is_idle));
                    }
                }
            }
        }

        if canceled.is_empty() && strict {
            return Err(EventError::NotFound(name_or_script.to_owned()));
        }
        for (record, idle) in &canceled {
            record.mark_dequeued_and_canceled();
            self.maybe_dispose(record, EventFlags::empty());
            self.notify(NotifyKind::Canceled, Some(record), *idle);
        }
        debug!(target = name_or_script, count = canceled.len(), "events canceled");
        Ok(canceled.len())
    }

    /// Empty both queues. Returns how many records were removed.
    ///
    /// # Errors
    ///
    /// `EventError::NotAccepting` after teardown.
    pub fn clear(&self) -> Result<usize, EventError> {
        let drained = {
            let mut state = self.state.lock();
            let (normal, idle) = state.both_mut()?;
            let mut drained = normal.drain();
            drained.extend(idle.drain());
            for idle in [false, true] {
                self.counters.depth(idle).0.store(0, Ordering::Relaxed);
                if let Err(err) = self.signals.empty(idle).set() {
                    warn!(error = %err, queue = queue_label(idle), "failed to signal empty queue");
                }
            }
            drained
        };
        for record in &drained {
            record.mark_dequeued_and_discarded();
            self.maybe_dispose(record, EventFlags::empty());
        }
        self.notify(NotifyKind::Cleared, None, false);
        info!(count = drained.len(), "event queues cleared");
        Ok(drained.len())
    }

    pub(crate) fn maybe_dispose(&self, record: &EventRecord, ambient: EventFlags) {
        self.counters.maybe_disposed.fetch_add(1, Ordering::Relaxed);
        if record.maybe_dispose(ambient) {
            self.counters.really_disposed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn notify(&self, kind: NotifyKind, record: Option<&EventRecord>, idle: bool) {
        if self.no_notify.load(Ordering::Acquire) {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };
        let notification: Notification = build_notification(
            kind,
            record.map(EventRecord::id),
            record.map(|r| r.name().to_owned()),
            idle,
        );
        notifier.notify(notification);
    }

    // ---------------------------------------------------------------------
    // enable / disable
    // ---------------------------------------------------------------------

    /// Whether dispatch runs.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable dispatch.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Disable dispatch and return the previous setting.
    pub fn save_enabled_and_force_disabled(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    /// Restore a setting saved by [`Self::save_enabled_and_force_disabled`].
    /// Returns whether the value changed.
    pub fn restore_enabled(&self, saved: bool) -> bool {
        self.enabled.swap(saved, Ordering::AcqRel) != saved
    }

    /// Whether a dispatch loop is running on any thread.
    pub fn is_active(&self) -> bool {
        self.levels() > 0
    }

    /// Current dispatch nesting depth.
    pub fn levels(&self) -> u64 {
        self.counters.levels.load(Ordering::Acquire)
    }

    /// Whether notifications are suppressed.
    pub fn no_notify(&self) -> bool {
        self.no_notify.load(Ordering::Acquire)
    }

    /// Suppress or allow notifications.
    pub fn set_no_notify(&self, no_notify: bool) {
        self.no_notify.store(no_notify, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // sleep table
    // ---------------------------------------------------------------------

    /// Sleep time for `kind`: table entry, else manager default, else
    /// [`DEFAULT_SLEEP_TIME_MS`].
    pub fn get_sleep_time(&self, kind: SleepType) -> u64 {
        let state = self.state.lock();
        state
            .sleep_times
            .get(&kind)
            .copied()
            .or(state.default_sleep_ms)
            .unwrap_or(DEFAULT_SLEEP_TIME_MS)
    }

    /// Set or remove (`None`) the sleep time for `kind`. Returns whether the
    /// table changed.
    pub fn set_sleep_time(&self, kind: SleepType, ms: Option<u64>) -> bool {
        let mut state = self.state.lock();
        set_table_entry(&mut state.sleep_times, kind, ms)
    }

    /// Sleep time for `kind`, raised to the minimum when below
    /// [`MINIMUM_SLEEP_TIME_MS`]. A per-kind minimum overrides the floor.
    pub fn get_minimum_sleep_time(&self, kind: SleepType) -> u64 {
        let sleep = self.get_sleep_time(kind);
        if sleep >= MINIMUM_SLEEP_TIME_MS {
            return sleep;
        }
        self.state
            .lock()
            .minimum_sleep_times
            .get(&kind)
            .copied()
            .unwrap_or(MINIMUM_SLEEP_TIME_MS)
    }

    /// Set or remove (`None`) the minimum sleep time for `kind`.
    pub fn set_minimum_sleep_time(&self, kind: SleepType, ms: Option<u64>) -> bool {
        let mut state = self.state.lock();
        set_table_entry(&mut state.minimum_sleep_times, kind, ms)
    }

    /// Manager-wide default sleep time.
    pub fn default_sleep_time(&self) -> Option<u64> {
        self.state.lock().default_sleep_ms
    }

    /// Set the manager-wide default sleep time.
    pub fn set_default_sleep_time(&self, ms: Option<u64>) {
        self.state.lock().default_sleep_ms = ms;
    }

    /// Sleep through the context for the configured time of `kind`.
    ///
    /// # Errors
    ///
    /// Whatever the context's sleep reports.
    pub fn sleep(
        &self,
        ctx: &dyn RuntimeContext,
        kind: SleepType,
        minimum: bool,
    ) -> Result<(), EventError> {
        let ms = if minimum {
            self.get_minimum_sleep_time(kind)
        } else {
            self.get_sleep_time(kind)
        };
        ctx.sleep(Duration::from_millis(ms))
    }

    /// Give up the rest of this time slice.
    pub fn yield_now(&self) {
        std::thread::yield_now();
    }

    // ---------------------------------------------------------------------
    // statistics and teardown
    // ---------------------------------------------------------------------

    /// Counter snapshot.
    pub fn stats(&self) -> EventStats {
        self.counters
            .snapshot(self.is_enabled(), self.is_disposed())
    }

    /// Whether [`Self::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Tear down: drain both queues, close the wait signals, zero counters.
    /// Only the first call does anything; it returns `true`.
    pub fn dispose(&self) -> bool {
        let drained = {
            let mut state = self.state.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return false;
            }
            let mut drained = state.normal.take().map(|mut q| q.drain()).unwrap_or_default();
            drained.extend(state.idle.take().map(|mut q| q.drain()).unwrap_or_default());
            state.sleep_times.clear();
            state.minimum_sleep_times.clear();
            self.signals.close_all();
            drained
        };
        for record in &drained {
            record.mark_dequeued_and_discarded();
            record.dispose();
        }
        self.counters.reset();
        self.enabled.store(false, Ordering::Release);
        info!(discarded = drained.len(), "event manager disposed");
        true
    }
}

/// Queue (`true` for idle) and index of the first ready record.
fn locate_ready(
    normal: &InMemoryEventQueue,
    idle: &InMemoryEventQueue,
    query: &ReadyQuery,
    flags: EventFlags,
) -> Option<(bool, usize)> {
    if let Some(index) = normal.scan_for_ready(query, |_| false) {
        return Some((false, index));
    }
    let normal_is_empty = normal.is_empty();
    if !readiness::should_scan_idle(flags, normal_is_empty) {
        return None;
    }
    idle.scan_for_ready(query, |record| {
        readiness::is_idle_suppressed(record.flags(), normal_is_empty)
    })
    .map(|index| (true, index))
}

fn matching_indices<F>(queue: &InMemoryEventQueue, mut matches: F) -> Vec<usize>
where
    F: FnMut(&EventRecord) -> bool,
{
    queue
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, record)| matches(record))
        .map(|(index, _)| index)
        .collect()
}

fn set_table_entry(table: &mut HashMap<SleepType, u64>, kind: SleepType, ms: Option<u64>) -> bool {
    match ms {
        Some(ms) => table.insert(kind, ms) != Some(ms),
        None => table.remove(&kind).is_some(),
    }
}
