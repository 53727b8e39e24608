//! Builders that turn configuration into ready-to-use managers.

pub mod manager_builder;

pub use manager_builder::build_event_manager;
