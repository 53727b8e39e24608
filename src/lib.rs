//! # Prometheus Event Manager
//!
//! A priority-ordered, idle-aware, thread-affinity-aware event scheduler for
//! embeddable scripting engines.
//!
//! The engine and its host use the manager for asynchronous callback
//! dispatch, deferred script evaluation, and the "block until something
//! happens" loops that interactive interpreters run while waiting on a
//! variable or a timer.
//!
//! ## Key Features
//!
//! - **Deterministic ordering**: records leave a queue by priority, then
//!   scheduled time, then arrival order
//! - **Two cooperating queues**: idle work runs only when the normal queue
//!   has nothing ready, and `IDLE_IF_EMPTY` work only when it is empty
//! - **Thread affinity**: records can be bound to a thread; greedy dequeues
//!   take them anyway
//! - **Wait conditions**: auto-reset signals for "queue became empty" and
//!   "event was queued" that never lose a wakeup
//! - **Failure containment**: callback errors and panics are collected into
//!   one aggregate error without corrupting scheduler state
//!
//! ## Dispatching events
//!
//! ```rust
//! use prometheus_event_manager::core::{
//!     DispatchOptions, EventManager, EventOutcome, EventRequest, HostContext,
//! };
//! use prometheus_event_manager::util::EventFlags;
//!
//! let manager = EventManager::default();
//! let ctx = HostContext::new("main");
//!
//! manager
//!     .enqueue(EventRequest::new("first", |_ctx, _payload| EventOutcome::ok()))
//!     .unwrap();
//! manager
//!     .enqueue(
//!         EventRequest::new("urgent", |_ctx, _payload| EventOutcome::ok_with("done"))
//!             .with_flags(EventFlags::IMMEDIATE)
//!             .immediate(),
//!     )
//!     .unwrap();
//!
//! let processed = manager
//!     .process_events(&ctx, &DispatchOptions::default())
//!     .unwrap();
//! assert_eq!(processed, 2);
//! ```
//!
//! ## Waiting for work
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! // Block up to one second for a producer on another thread.
//! manager.wait_for_event_enqueued(Some(Duration::from_secs(1)), false, false)?;
//! manager.do_one_pass(&ctx, &DispatchOptions::default())?;
//! ```
//!
//! For complete examples, see:
//! - `tests/event_manager_test.rs` - ordering, suppression, and affinity
//! - `tests/dispatch_test.rs` - dispatch and service loop behaviour

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct managers from configuration.
pub mod builders;
/// Configuration models for the event manager.
pub mod config;
/// Event records, readiness rules, the manager, dispatch, and waits.
pub mod core;
/// Infrastructure: queue storage.
pub mod infra;
/// Serializable API models and async adapters.
pub mod runtime;
/// Auto-reset wait signal.
pub mod signal;
/// Shared utilities.
pub mod util;
