//! Pure decision tables for priority resolution, thread affinity, readiness,
//! and idle suppression. Nothing here touches a lock.

use std::thread::{self, ThreadId};

use crate::core::event::{EventRecord, ScheduleTime, ThreadTarget};
use crate::util::serde::{EventFlags, EventPriority};

/// Result of testing one queued record against a dequeue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    /// The record can be dequeued.
    Ready,
    /// Not this record, but a later one might be.
    Skip,
    /// Neither this record nor any later one can be ready.
    Stop,
}

/// A resolved dequeue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyQuery {
    /// Current time in milliseconds.
    pub now_ms: u128,
    /// Lowest priority accepted; never `Automatic`.
    pub priority: EventPriority,
    /// Thread the caller dequeues for.
    pub thread: Option<ThreadId>,
    /// Caller flags.
    pub flags: EventFlags,
}

impl ReadyQuery {
    /// Resolve automatic priority and thread targets from the caller flags.
    #[must_use]
    pub fn resolve(
        now_ms: u128,
        flags: EventFlags,
        priority: EventPriority,
        thread: ThreadTarget,
    ) -> Self {
        Self {
            now_ms,
            priority: automatic_priority(flags, priority),
            thread: automatic_thread(thread),
            flags,
        }
    }

    /// Classify one record.
    #[must_use]
    pub fn check(&self, record: &EventRecord) -> ScanVerdict {
        if !is_priority_ready(record.priority(), self.priority) {
            return ScanVerdict::Stop;
        }
        if !is_time_ready(record.when(), self.now_ms) {
            return ScanVerdict::Stop;
        }
        if !is_thread_ready(record.thread(), record.flags(), self.thread, self.flags) {
            return ScanVerdict::Skip;
        }
        if !are_flags_ready(record.flags(), self.flags) {
            return ScanVerdict::Skip;
        }
        ScanVerdict::Ready
    }
}

/// Resolve `Automatic` from the flags. Idle wins over After because idle
/// records usually carry the After flag too.
#[must_use]
pub fn automatic_priority(flags: EventFlags, priority: EventPriority) -> EventPriority {
    if priority != EventPriority::Automatic {
        return priority;
    }
    if flags.contains(EventFlags::IDLE) {
        EventPriority::Idle
    } else if flags.contains(EventFlags::AFTER) {
        EventPriority::After
    } else if flags.contains(EventFlags::IMMEDIATE) {
        EventPriority::Immediate
    } else {
        EventPriority::Normal
    }
}

/// Resolve a thread target to a concrete thread id.
#[must_use]
pub fn automatic_thread(target: ThreadTarget) -> Option<ThreadId> {
    match target {
        ThreadTarget::Any => None,
        ThreadTarget::Current => Some(thread::current().id()),
        ThreadTarget::Specific(id) => Some(id),
    }
}

/// Record priority is at least as urgent as the requested one.
#[must_use]
pub fn is_priority_ready(record: EventPriority, requested: EventPriority) -> bool {
    record.rank() <= requested.rank()
}

/// Record is due.
#[must_use]
pub const fn is_time_ready(when: ScheduleTime, now_ms: u128) -> bool {
    match when {
        ScheduleTime::Immediate => true,
        ScheduleTime::At(at) => now_ms >= at,
    }
}

/// Thread affinity check. A named caller thread must match exactly; otherwise
/// greedy on either side accepts, and plain callers only take unbound records.
#[must_use]
pub fn is_thread_ready(
    record_thread: Option<ThreadId>,
    record_flags: EventFlags,
    caller_thread: Option<ThreadId>,
    caller_flags: EventFlags,
) -> bool {
    if let Some(caller) = caller_thread {
        return record_thread == Some(caller);
    }
    if caller_flags.contains(EventFlags::GREEDY_THREAD)
        || record_flags.contains(EventFlags::GREEDY_THREAD)
    {
        return true;
    }
    record_thread.is_none()
}

/// Flag filter: an empty caller mask accepts everything.
#[must_use]
pub fn are_flags_ready(record_flags: EventFlags, caller_flags: EventFlags) -> bool {
    let mask = caller_flags & EventFlags::DEQUEUE_MASK;
    mask.is_empty() || record_flags.intersects(mask)
}

/// Whether the idle queue may be scanned at all.
#[must_use]
pub fn should_scan_idle(caller_flags: EventFlags, normal_is_empty: bool) -> bool {
    if caller_flags.contains(EventFlags::NO_IDLE) {
        return false;
    }
    !(caller_flags.contains(EventFlags::IDLE_IF_EMPTY) && !normal_is_empty)
}

/// Whether an idle record is held back by a non-empty normal queue.
#[must_use]
pub fn is_idle_suppressed(record_flags: EventFlags, normal_is_empty: bool) -> bool {
    record_flags.contains(EventFlags::IDLE_IF_EMPTY) && !normal_is_empty
}
