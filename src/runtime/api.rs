//! API-facing request/response models.

use serde::{Deserialize, Serialize};

use crate::core::{EventError, EventManager, EventRequest, EventSnapshot, EventStats};
use crate::util::serde::{EventFlags, EventPriority};

/// Script submission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSubmission {
    /// Event name.
    pub name: String,
    /// Script text evaluated by the runtime context.
    pub script: String,
    /// Event flags.
    #[serde(default)]
    pub flags: EventFlags,
    /// Priority; `automatic` resolves from the flags.
    #[serde(default)]
    pub priority: EventPriority,
    /// Delay from now in milliseconds; absent means due now.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Queue limit; zero means the manager default.
    #[serde(default)]
    pub limit: usize,
}

/// Both queues plus counters at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDump {
    /// Snapshot time (ms since epoch, manager clock).
    pub taken_at_ms: u128,
    /// Normal queue, in dequeue order.
    pub normal: Vec<EventSnapshot>,
    /// Idle queue, in dequeue order.
    pub idle: Vec<EventSnapshot>,
    /// Counters.
    pub stats: EventStats,
}

/// Health response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Accepting work.
    pub ok: bool,
    /// Dispatch enabled.
    pub enabled: bool,
    /// A dispatch pass is running.
    pub active: bool,
}

/// Queue a script submission. The snapshot's index is the position the
/// record landed at.
///
/// # Errors
///
/// Whatever [`EventManager::enqueue_script`] reports.
pub fn submit_script(
    manager: &EventManager,
    submission: ScriptSubmission,
) -> Result<EventSnapshot, EventError> {
    let mut request = EventRequest::without_callback(submission.name)
        .with_flags(submission.flags)
        .with_priority(submission.priority)
        .with_limit(submission.limit);
    if let Some(delay) = submission.delay_ms {
        request = request.at(manager.now_ms() + u128::from(delay));
    }
    let (record, index) =
        manager.enqueue_indexed(EventManager::script_request(submission.script, request))?;
    let idle = record.flags().contains(EventFlags::IDLE);
    Ok(record.to_snapshot(index, idle))
}

/// Capture both queues and the counters.
///
/// # Errors
///
/// `EventError::NotAccepting` after teardown.
pub fn dump_manager(manager: &EventManager) -> Result<QueueDump, EventError> {
    let (idle, normal): (Vec<_>, Vec<_>) = manager.dump()?.into_iter().partition(|s| s.idle);
    Ok(QueueDump {
        taken_at_ms: manager.now_ms(),
        normal,
        idle,
        stats: manager.stats(),
    })
}

/// Health summary.
pub fn health(manager: &EventManager) -> Health {
    Health {
        ok: !manager.is_disposed(),
        enabled: manager.is_enabled(),
        active: manager.is_active(),
    }
}
