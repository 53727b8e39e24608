//! Serializable API models and async adapters.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_waiter;

pub use api::{dump_manager, health, submit_script, Health, QueueDump, ScriptSubmission};
#[cfg(feature = "tokio-runtime")]
pub use tokio_waiter::{wait_for_empty_queue_async, wait_for_event_enqueued_async, wait_result_async};
