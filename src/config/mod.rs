//! Configuration models for the event manager.

pub mod manager;

pub use manager::{EventManagerConfig, ENV_PREFIX, MAX_SLEEP_MS};
