//! Infrastructure adapters for event storage.

pub mod queue;

pub use queue::InMemoryEventQueue;
