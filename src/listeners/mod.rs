//! # Event listeners.
//!
//! This module provides the [`Listener`] trait, the [`ListenerRegistry`] the
//! coordinator dispatches through, and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Worker ── publish ──► Bus ──► Consumer ──► ListenerRegistry::dispatch(&Event)
//!                                                   │ (in registration order)
//!                                  ┌────────────────┼──────────────┬──────────┐
//!                                  ▼                ▼              ▼          ▼
//!                             RunTracker   TelemetryMonitor   LogWriter   user ...
//! ```
//!
//! ## Listener types
//! - **Passive listeners** observe events (logging, printing, alerts)
//! - **Stateful listeners** fold events into state ([`RunTracker`](crate::state::RunTracker))

mod listener;
mod log;
mod registry;

pub use listener::{Listener, ListenerFn, ListenerRef};
pub use log::LogWriter;
pub use registry::ListenerRegistry;
pub(crate) use registry::panic_message;
