//! Dispatch loop: dequeue ready records and run their callbacks.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::core::event::{EventOutcome, ThreadTarget};
use crate::core::{EventError, EventManager, RuntimeContext};
use crate::util::serde::{EventFlags, EventPriority, ReturnCode, SleepType};

/// Parameters of one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Dequeue filter and ambient flags.
    pub flags: EventFlags,
    /// Lowest priority to dispatch; `Automatic` resolves from `flags`.
    pub priority: EventPriority,
    /// Thread the pass dispatches for.
    pub thread: ThreadTarget,
    /// Maximum dequeue attempts; zero means until nothing is ready.
    pub limit: usize,
    /// Stop at the first callback error.
    pub stop_on_error: bool,
    /// Fail the pass once the queues run dry.
    pub error_on_empty: bool,
    /// Pump the user interface after a successful pass.
    pub user_interface: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            flags: EventFlags::SERVICE,
            priority: EventPriority::Automatic,
            thread: ThreadTarget::Any,
            limit: 0,
            stop_on_error: false,
            error_on_empty: false,
            user_interface: false,
        }
    }
}

impl DispatchOptions {
    /// Replace the flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the priority ceiling.
    #[must_use]
    pub const fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the thread target.
    #[must_use]
    pub const fn with_thread(mut self, thread: ThreadTarget) -> Self {
        self.thread = thread;
        self
    }

    /// Set the attempt limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Stop at the first error.
    #[must_use]
    pub const fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Fail once nothing more is ready.
    #[must_use]
    pub const fn error_on_empty(mut self, error: bool) -> Self {
        self.error_on_empty = error;
        self
    }

    /// Pump the user interface after each pass.
    #[must_use]
    pub const fn user_interface(mut self, pump: bool) -> Self {
        self.user_interface = pump;
        self
    }
}

/// Keeps the nesting depth accurate on every exit path.
struct LevelGuard<'a> {
    levels: &'a AtomicU64,
}

impl<'a> LevelGuard<'a> {
    fn enter(levels: &'a AtomicU64) -> Self {
        levels.fetch_add(1, Ordering::AcqRel);
        Self { levels }
    }
}

impl Drop for LevelGuard<'_> {
    fn drop(&mut self) {
        self.levels.fetch_sub(1, Ordering::AcqRel);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(
            || "callback panicked".to_owned(),
            |msg| format!("callback panicked: {msg}"),
        )
}

impl EventManager {
    /// Run ready callbacks until nothing is ready, the limit is reached, or a
    /// callback stops the pass. Returns the number of callbacks invoked.
    ///
    /// Callback failures never unwind out of here. A `Return` code ends the
    /// pass; `Break` ends it with an error; other failures go through the
    /// context's background error policy unless `NO_BG_ERROR` is set.
    ///
    /// # Errors
    ///
    /// `EventError::Aggregate` with every failure observed during the pass.
    pub fn process_events(
        &self,
        ctx: &dyn RuntimeContext,
        options: &DispatchOptions,
    ) -> Result<usize, EventError> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let _level = LevelGuard::enter(&self.counters.levels);

        let mut processed = 0usize;
        let mut attempts = 0usize;
        let mut errors = Vec::new();
        let mut ran_dry = false;

        while self.is_enabled() && (options.limit == 0 || attempts < options.limit) {
            attempts += 1;
            let record = match self.dequeue_ready(
                self.now_ms(),
                options.flags,
                options.priority,
                options.thread,
                false,
            ) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    ran_dry = true;
                    break;
                }
                Err(err) => {
                    errors.push(err);
                    break;
                }
            };

            let Some(callback) = record.callback() else {
                record.mark_dequeued_and_discarded();
                self.maybe_dispose(&record, options.flags);
                continue;
            };
            let payload = record.payload();
            let outcome = catch_unwind(AssertUnwindSafe(|| callback.invoke(ctx, &payload)))
                .unwrap_or_else(|panic| EventOutcome::error(panic_message(panic.as_ref())));
            record.mark_completed();
            processed += 1;
            self.counters.total_processed.fetch_add(1, Ordering::Relaxed);
            record.set_result(outcome.clone());
            debug!(
                event = record.name(),
                code = %outcome.code,
                context = ctx.name(),
                "event processed"
            );

            let stop = match outcome.code {
                ReturnCode::Ok | ReturnCode::Continue => false,
                ReturnCode::Return => true,
                ReturnCode::Break => {
                    errors.push(outcome.to_error());
                    true
                }
                ReturnCode::Error => {
                    let error = outcome.to_error();
                    warn!(event = record.name(), error = %error, "event callback failed");
                    let skip_policy = options.flags.contains(EventFlags::NO_BG_ERROR)
                        || record.flags().contains(EventFlags::NO_BG_ERROR);
                    let keep_going =
                        skip_policy || ctx.handle_background_error(outcome.code, &error);
                    errors.push(error);
                    options.stop_on_error || !ctx.is_alive() || !keep_going
                }
            };
            self.maybe_dispose(&record, options.flags);
            if stop {
                break;
            }
        }

        if options.error_on_empty && (ran_dry || !self.ready_for(options)) {
            errors.push(EventError::Exhausted { processed });
        }
        if errors.is_empty() {
            Ok(processed)
        } else {
            Err(EventError::Aggregate { processed, errors })
        }
    }

    /// Whether a pass with `options` would find a record right now. A torn
    /// down manager has nothing ready.
    fn ready_for(&self, options: &DispatchOptions) -> bool {
        self.has_ready(self.now_ms(), options.flags, options.priority, options.thread)
            .unwrap_or(false)
    }

    /// One dispatch pass, then a user-interface pump when requested.
    ///
    /// # Errors
    ///
    /// Failures from the pass or from the pump.
    pub fn do_one_pass(
        &self,
        ctx: &dyn RuntimeContext,
        options: &DispatchOptions,
    ) -> Result<usize, EventError> {
        let processed = self.process_events(ctx, options)?;
        if options.user_interface {
            ctx.pump_user_interface()?;
        }
        Ok(processed)
    }

    /// Blocking service loop: pass, sleep, repeat, until the context stops
    /// being ready or a pass fails.
    ///
    /// # Errors
    ///
    /// Always ends with an error: the context's liveness error, a pass
    /// failure, a sleep failure, or `NotAccepting` after teardown.
    pub fn service_events(
        &self,
        ctx: &dyn RuntimeContext,
        options: &DispatchOptions,
    ) -> Result<Infallible, EventError> {
        loop {
            ctx.event_ready()?;
            if self.is_disposed() {
                return Err(EventError::NotAccepting("events".into()));
            }
            self.do_one_pass(ctx, options)?;
            self.sleep(ctx, SleepType::Service, true)?;
        }
    }
}
