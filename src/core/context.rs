//! Runtime context: the interpreter-side collaborator driven by the dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::{EventError, EventOutcome};
use crate::util::serde::{EventFlags, ReturnCode};

/// Interface the scheduler needs from the runtime that owns it.
///
/// The dispatcher receives the context at call time and never stores it, so a
/// host can drive one manager from several contexts or tear either side down
/// first. Every method has a default suitable for a bare host.
///
/// ```
/// use prometheus_event_manager::core::{EventOutcome, RuntimeContext};
/// use prometheus_event_manager::util::EventFlags;
///
/// struct Echo;
///
/// impl RuntimeContext for Echo {
///     fn evaluate_script(&self, text: &str, _flags: EventFlags) -> EventOutcome {
///         EventOutcome::ok_with(text)
///     }
/// }
///
/// let outcome = Echo.evaluate_script("puts hi", EventFlags::empty());
/// assert_eq!(outcome.value.as_deref(), Some("puts hi"));
/// ```
pub trait RuntimeContext: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "runtime"
    }

    /// Whether the context can still run callbacks.
    fn is_alive(&self) -> bool {
        true
    }

    /// Liveness check used by the service loop before every pass.
    ///
    /// # Errors
    ///
    /// `EventError::Canceled` once the context is gone.
    fn event_ready(&self) -> Result<(), EventError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(EventError::Canceled(format!(
                "context \"{}\" is no longer alive",
                self.name()
            )))
        }
    }

    /// Background error policy. Returning `false` stops the dispatch loop.
    fn handle_background_error(&self, code: ReturnCode, error: &EventError) -> bool {
        warn!(context = self.name(), %code, %error, "background event error");
        true
    }

    /// Evaluate script text queued through `enqueue_script`.
    fn evaluate_script(&self, text: &str, flags: EventFlags) -> EventOutcome {
        let _ = (text, flags);
        EventOutcome::error(format!(
            "context \"{}\" cannot evaluate scripts",
            self.name()
        ))
    }

    /// Sleep between service passes.
    ///
    /// # Errors
    ///
    /// Implementations may refuse to sleep (for example when canceled).
    fn sleep(&self, duration: Duration) -> Result<(), EventError> {
        std::thread::sleep(duration);
        Ok(())
    }

    /// Give a user interface a chance to process its own messages.
    ///
    /// # Errors
    ///
    /// Implementations report a failed message pump.
    fn pump_user_interface(&self) -> Result<(), EventError> {
        Ok(())
    }
}

/// Script evaluator plugged into a [`HostContext`].
pub type ScriptEvaluator = Arc<dyn Fn(&str, EventFlags) -> EventOutcome + Send + Sync>;

/// What a [`HostContext`] does after a background error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundErrorPolicy {
    /// Record the error and keep dispatching.
    #[default]
    Continue,
    /// Record the error and stop the current dispatch.
    Stop,
}

/// Ready-made context for hosts without an interpreter of their own.
///
/// Supports cancellation, an optional script evaluator, a background error
/// policy, and keeps the messages of every background error it was handed.
pub struct HostContext {
    name: String,
    canceled: AtomicBool,
    deleted: AtomicBool,
    policy: BackgroundErrorPolicy,
    evaluator: Option<ScriptEvaluator>,
    background_errors: Mutex<Vec<String>>,
}

impl HostContext {
    /// Create a live context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            canceled: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            policy: BackgroundErrorPolicy::Continue,
            evaluator: None,
            background_errors: Mutex::new(Vec::new()),
        }
    }

    /// Install a script evaluator.
    #[must_use]
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str, EventFlags) -> EventOutcome + Send + Sync + 'static,
    {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Set the background error policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: BackgroundErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask running service loops to stop.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Clear a previous cancellation.
    pub fn reset_cancel(&self) {
        self.canceled.store(false, Ordering::Release);
    }

    /// Mark the context as deleted; it stops being alive.
    pub fn delete(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Messages of every background error seen so far.
    pub fn background_errors(&self) -> Vec<String> {
        self.background_errors.lock().clone()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("name", &self.name)
            .field("canceled", &self.canceled.load(Ordering::Acquire))
            .field("deleted", &self.deleted.load(Ordering::Acquire))
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext for HostContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        !self.deleted.load(Ordering::Acquire)
    }

    fn event_ready(&self) -> Result<(), EventError> {
        if !self.is_alive() {
            return Err(EventError::Canceled(format!(
                "context \"{}\" was deleted",
                self.name
            )));
        }
        if self.canceled.load(Ordering::Acquire) {
            return Err(EventError::Canceled(format!(
                "context \"{}\" was canceled",
                self.name
            )));
        }
        Ok(())
    }

    fn handle_background_error(&self, code: ReturnCode, error: &EventError) -> bool {
        warn!(context = %self.name, %code, %error, "background event error");
        self.background_errors.lock().push(error.to_string());
        self.policy == BackgroundErrorPolicy::Continue
    }

    fn evaluate_script(&self, text: &str, flags: EventFlags) -> EventOutcome {
        match &self.evaluator {
            Some(evaluator) => evaluator(text, flags),
            None => EventOutcome::error(format!(
                "context \"{}\" cannot evaluate scripts",
                self.name
            )),
        }
    }

    fn sleep(&self, duration: Duration) -> Result<(), EventError> {
        self.event_ready()?;
        std::thread::sleep(duration);
        Ok(())
    }
}
