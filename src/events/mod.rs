//! Lifecycle events: types, topics and the worker → coordinator bus.
//!
//! This module groups the event **data model**, the **topics** listeners
//! subscribe to, and the **bus** used to carry events from workers back to the
//! single coordinator.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`EventScope`] event classification and payload
//! - [`Topic`] subscription matching (wildcard, kind, owner-specific name)
//! - [`Bus`] / [`EventStream`] thin wrapper over an unbounded `tokio::sync::mpsc`
//! - [`Emitter`] bus handle bound to one paramset
//!
//! ## Quick reference
//! - **Publishers**: `Runner` (experiment start), worker wrapper (paramset events),
//!   `Step::run` (step events).
//! - **Consumer**: `Consumer::consume_until`, which fans out to the listener registry
//!   and synthesizes `ExperimentSuccess` / `ExperimentEnd`.

mod bus;
mod emitter;
mod event;
mod topic;

pub use bus::{Bus, EventStream};
pub use emitter::Emitter;
pub use event::{Event, EventKind, EventScope, now, now_in};
pub use topic::Topic;
