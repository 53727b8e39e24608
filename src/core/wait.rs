//! Blocking waits on the queue-empty and event-enqueued conditions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::core::{EventError, EventManager};
use crate::signal::WaitSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitKind {
    Empty,
    Enqueued,
}

impl EventManager {
    /// Wait until the normal (or idle) queue becomes empty.
    ///
    /// The signal is probed first. Unless `strict`, the queue itself is
    /// re-checked before and after blocking, which covers a signal consumed
    /// by another waiter. `None` blocks until signaled.
    ///
    /// # Errors
    ///
    /// - `EventError::Timeout` when the condition did not occur in time
    /// - `EventError::SignalFailure` after teardown
    pub fn wait_for_empty_queue(
        &self,
        timeout: Option<Duration>,
        idle: bool,
        strict: bool,
    ) -> Result<(), EventError> {
        self.wait_for(WaitKind::Empty, timeout, idle, strict)
    }

    /// Wait until a record is queued on the normal (or idle) queue.
    ///
    /// Same protocol as [`EventManager::wait_for_empty_queue`], with the
    /// non-strict re-check testing for a non-empty queue.
    ///
    /// # Errors
    ///
    /// - `EventError::Timeout` when nothing was queued in time
    /// - `EventError::SignalFailure` after teardown
    pub fn wait_for_event_enqueued(
        &self,
        timeout: Option<Duration>,
        idle: bool,
        strict: bool,
    ) -> Result<(), EventError> {
        self.wait_for(WaitKind::Enqueued, timeout, idle, strict)
    }

    fn wait_counters(&self, kind: WaitKind) -> (&AtomicU64, &AtomicU64) {
        match kind {
            WaitKind::Empty => (
                &self.counters.empty_wait_attempts,
                &self.counters.empty_wait_errors,
            ),
            WaitKind::Enqueued => (
                &self.counters.enqueued_wait_attempts,
                &self.counters.enqueued_wait_errors,
            ),
        }
    }

    fn wait_for(
        &self,
        kind: WaitKind,
        timeout: Option<Duration>,
        idle: bool,
        strict: bool,
    ) -> Result<(), EventError> {
        let (attempts, errors) = self.wait_counters(kind);
        attempts.fetch_add(1, Ordering::Relaxed);
        let result = self.wait_protocol(kind, timeout, idle, strict);
        if let Err(err) = &result {
            errors.fetch_add(1, Ordering::Relaxed);
            debug!(?kind, idle, error = %err, "queue wait failed");
        }
        result
    }

    fn wait_protocol(
        &self,
        kind: WaitKind,
        timeout: Option<Duration>,
        idle: bool,
        strict: bool,
    ) -> Result<(), EventError> {
        if self.is_disposed() {
            return Err(EventError::SignalFailure("event manager is disposed".into()));
        }
        let signal: &WaitSignal = match kind {
            WaitKind::Empty => self.signals().empty(idle),
            WaitKind::Enqueued => self.signals().enqueued(idle),
        };

        if signal.wait(Some(Duration::ZERO))? {
            return Ok(());
        }
        if !strict && self.condition_holds(kind, idle)? {
            return Ok(());
        }
        if signal.wait(timeout)? {
            return Ok(());
        }
        if !strict && self.condition_holds(kind, idle)? {
            return Ok(());
        }
        Err(EventError::Timeout)
    }

    fn condition_holds(&self, kind: WaitKind, idle: bool) -> Result<bool, EventError> {
        let empty = self
            .is_empty(idle)
            .map_err(|err| EventError::SignalFailure(err.to_string()))?;
        Ok(match kind {
            WaitKind::Empty => empty,
            WaitKind::Enqueued => !empty,
        })
    }
}
