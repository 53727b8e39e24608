//! Error types for event manager operations.

use thiserror::Error;

use crate::util::serde::ReturnCode;

/// Errors produced by the event manager and its dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The manager has been torn down, or the target queue no longer exists.
    #[error("not accepting {0}")]
    NotAccepting(String),
    /// A bounded enqueue found the queue full.
    #[error("{0} limit would be exceeded")]
    LimitExceeded(String),
    /// A strict dequeue found nothing ready.
    #[error("no events are ready")]
    NoEventsReady,
    /// A dispatch pass asked to fail once nothing more is ready.
    #[error("no more events are ready, processed: {processed}")]
    Exhausted {
        /// Number of callbacks invoked before the queues ran dry.
        processed: usize,
    },
    /// Named lookup or cancel found no match.
    #[error("event \"{0}\" doesn't exist")]
    NotFound(String),
    /// A listing pattern could not be parsed.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    /// A wait condition could not be signaled or waited on.
    #[error("signal failure: {0}")]
    SignalFailure(String),
    /// A wait exceeded its budget.
    #[error("timed out")]
    Timeout,
    /// A callback returned non-success, or panicked.
    #[error("callback failed ({code}): {message}")]
    CallbackFailure {
        /// Code the callback returned.
        code: ReturnCode,
        /// Result text of the callback.
        message: String,
    },
    /// The runtime context refused to keep servicing events.
    #[error("canceled: {0}")]
    Canceled(String),
    /// Every failure observed by one dispatch pass.
    #[error("{} error(s) while processing {processed} event(s): {}", .errors.len(), join_errors(.errors))]
    Aggregate {
        /// Number of callbacks invoked.
        processed: usize,
        /// Failures in the order they were observed.
        errors: Vec<EventError>,
    },
}

impl EventError {
    /// Build a [`EventError::CallbackFailure`].
    pub fn callback(code: ReturnCode, message: impl Into<String>) -> Self {
        Self::CallbackFailure {
            code,
            message: message.into(),
        }
    }

    /// Failures carried by an aggregate, or the error itself otherwise.
    #[must_use]
    pub fn errors(&self) -> &[Self] {
        match self {
            Self::Aggregate { errors, .. } => errors,
            other => std::slice::from_ref(other),
        }
    }
}

fn join_errors(errors: &[EventError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
