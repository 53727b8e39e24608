//! Auto-reset wait signal.
//!
//! A [`WaitSignal`] remembers one `set` until a waiter consumes it, so a
//! producer that signals before the consumer starts waiting is never lost.
//! After [`WaitSignal::close`] every wait fails immediately.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::EventError;

#[derive(Debug, Default)]
struct SignalState {
    signaled: bool,
    closed: bool,
}

/// Auto-reset event built from a `parking_lot` mutex and condvar.
///
/// ```
/// use std::time::Duration;
/// use prometheus_event_manager::signal::WaitSignal;
///
/// let signal = WaitSignal::new("normal-enqueued");
/// signal.set().unwrap();
/// assert!(signal.wait(Some(Duration::ZERO)).unwrap());
/// assert!(!signal.wait(Some(Duration::ZERO)).unwrap());
/// ```
#[derive(Debug)]
pub struct WaitSignal {
    name: &'static str,
    state: Mutex<SignalState>,
    cvar: Condvar,
}

impl WaitSignal {
    /// Create an unsignaled signal.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(SignalState {
                signaled: false,
                closed: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Raise the signal and wake one waiter.
    ///
    /// # Errors
    ///
    /// `EventError::SignalFailure` once the signal is closed.
    pub fn set(&self) -> Result<(), EventError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        state.signaled = true;
        self.cvar.notify_one();
        Ok(())
    }

    /// Wait for the signal and consume it. `None` waits forever; a zero
    /// duration only probes. Returns `false` on timeout.
    ///
    /// # Errors
    ///
    /// `EventError::SignalFailure` if the signal is or becomes closed.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool, EventError> {
        let probe_only = timeout.is_some_and(|timeout| timeout.is_zero());
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(self.closed_error());
            }
            if state.signaled {
                state.signaled = false;
                return Ok(true);
            }
            if probe_only {
                return Ok(false);
            }
            // re-waits after losing the signal to another waiter keep the deadline
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return Err(self.closed_error());
                        }
                        let signaled = std::mem::take(&mut state.signaled);
                        return Ok(signaled);
                    }
                }
                None => self.cvar.wait(&mut state),
            }
        }
    }

    /// Close the signal and wake every waiter. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.signaled = false;
        self.cvar.notify_all();
        true
    }

    /// Whether [`WaitSignal::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn closed_error(&self) -> EventError {
        EventError::SignalFailure(format!("{} signal is closed", self.name))
    }
}
