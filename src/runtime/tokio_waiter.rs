//! Async wrappers over the blocking waits.
//!
//! Each wait runs on tokio's blocking pool so the condvar never parks an
//! async worker thread.

use std::sync::Arc;
use std::time::Duration;

use crate::core::{EventError, EventManager, EventOutcome, EventRecord};

fn join_error(err: &tokio::task::JoinError) -> EventError {
    EventError::SignalFailure(format!("wait task failed: {err}"))
}

/// Async [`EventManager::wait_for_empty_queue`].
///
/// # Errors
///
/// Same as the blocking call, plus `SignalFailure` if the blocking task dies.
pub async fn wait_for_empty_queue_async(
    manager: Arc<EventManager>,
    timeout: Option<Duration>,
    idle: bool,
    strict: bool,
) -> Result<(), EventError> {
    tokio::task::spawn_blocking(move || manager.wait_for_empty_queue(timeout, idle, strict))
        .await
        .map_err(|e| join_error(&e))?
}

/// Async [`EventManager::wait_for_event_enqueued`].
///
/// # Errors
///
/// Same as the blocking call, plus `SignalFailure` if the blocking task dies.
pub async fn wait_for_event_enqueued_async(
    manager: Arc<EventManager>,
    timeout: Option<Duration>,
    idle: bool,
    strict: bool,
) -> Result<(), EventError> {
    tokio::task::spawn_blocking(move || manager.wait_for_event_enqueued(timeout, idle, strict))
        .await
        .map_err(|e| join_error(&e))?
}

/// Async [`EventRecord::wait_result`].
///
/// # Errors
///
/// Same as the blocking call, plus `SignalFailure` if the blocking task dies.
pub async fn wait_result_async(
    record: Arc<EventRecord>,
    timeout: Option<Duration>,
) -> Result<EventOutcome, EventError> {
    tokio::task::spawn_blocking(move || record.wait_result(timeout))
        .await
        .map_err(|e| join_error(&e))?
}
