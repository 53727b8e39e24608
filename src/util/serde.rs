//! Serializable vocabulary shared by the scheduler, its records, and its config.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Dispatch priority of an event.
///
/// Lower numeric values mean higher priority, so the derived ordering sorts
/// `Immediate` first and `Idle` last. `Automatic` is only meaningful on input;
/// it is resolved from the event flags before a record is queued.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// Runs ahead of everything else.
    Immediate = 0,
    /// Timer ("after") events.
    After = 1,
    /// Ordinary queued work.
    Normal = 2,
    /// Runs only when nothing more important is ready.
    Idle = 3,
    /// Resolve from the event flags at enqueue/dequeue time.
    #[default]
    Automatic = 255,
}

impl EventPriority {
    /// Numeric rank used by the readiness predicate and the sort key.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Immediate => "immediate",
            Self::After => "after",
            Self::Normal => "normal",
            Self::Idle => "idle",
            Self::Automatic => "automatic",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Behavioural flags carried by events and by dequeue/dispatch requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventFlags: u32 {
        /// Lives in the idle queue.
        const IDLE = 1 << 0;
        /// Immediate priority when resolved automatically.
        const IMMEDIATE = 1 << 1;
        /// Timer event; After priority when resolved automatically.
        const AFTER = 1 << 2;
        /// Dequeue regardless of thread affinity.
        const GREEDY_THREAD = 1 << 3;
        /// Nobody reads the outcome; dispose right after dispatch.
        const FIRE_AND_FORGET = 1 << 4;
        /// Trace script evaluation.
        const DEBUG = 1 << 5;
        /// Never dispatch from the idle queue.
        const NO_IDLE = 1 << 6;
        /// Dispatch idle work only while the normal queue is empty.
        const IDLE_IF_EMPTY = 1 << 7;
        /// Skip the background error policy.
        const NO_BG_ERROR = 1 << 8;
        /// Set on every record once it has been queued.
        const QUEUED = 1 << 9;
        /// Created by the scheduler itself.
        const INTERNAL = 1 << 10;
        /// Payload is script text evaluated by the runtime context.
        const SCRIPT = 1 << 11;

        /// Flags that take part in the dequeue filter.
        const DEQUEUE_MASK = Self::IDLE.bits()
            | Self::IMMEDIATE.bits()
            | Self::AFTER.bits()
            | Self::QUEUED.bits();

        /// Default flags for a service loop: everything queued, idle included.
        const SERVICE = Self::QUEUED.bits() | Self::IDLE.bits();
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome code of a callback, mirroring the interpreter's completion codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    /// Success.
    Ok,
    /// Failure.
    Error,
    /// Stop dispatching and report success.
    Return,
    /// Stop dispatching and report failure.
    Break,
    /// Keep dispatching and report success.
    Continue,
}

impl ReturnCode {
    /// `true` only for [`ReturnCode::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
        };
        f.write_str(name)
    }
}

/// Purpose keys for the sleep-time table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepType {
    /// Between passes of the blocking service loop.
    Service,
    /// While waiting on a child process.
    Process,
    /// While polling a socket.
    Socket,
    /// Generic host waits.
    Wait,
}

impl SleepType {
    /// Every sleep purpose.
    pub const ALL: [Self; 4] = [Self::Service, Self::Process, Self::Socket, Self::Wait];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_ordering() {
        assert!(EventPriority::Immediate < EventPriority::After);
        assert!(EventPriority::After < EventPriority::Normal);
        assert!(EventPriority::Normal < EventPriority::Idle);
        assert_eq!(EventPriority::Idle.rank(), 3);
    }

    #[test]
    fn test_dequeue_mask_excludes_behaviour_flags() {
        assert!(!EventFlags::DEQUEUE_MASK.contains(EventFlags::FIRE_AND_FORGET));
        assert!(!EventFlags::DEQUEUE_MASK.contains(EventFlags::GREEDY_THREAD));
        assert!(EventFlags::DEQUEUE_MASK.contains(EventFlags::QUEUED));
    }

    #[test]
    fn test_sleep_type_serde_names() {
        let json = serde_json::to_string(&SleepType::Service).unwrap();
        assert_eq!(json, "\"service\"");
    }
}
