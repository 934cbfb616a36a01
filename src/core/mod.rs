//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Runner`] (with [`RunReport`]), the
//! configuration types and the run/worker context.
//!
//! Internal modules:
//! - [`runner`]: builds listeners and state, spawns workers, drives the run;
//! - [`worker`]: executes one paramset and publishes its lifecycle;
//! - [`consumer`]: the coordinator event loop with count-based termination;
//! - [`context`]: run identity slot and task-local paramset context;
//! - [`shutdown`]: cross-platform shutdown signal handling;
//! - [`config`]: runner and telemetry settings.

mod config;
mod consumer;
mod context;
mod runner;
mod shutdown;
mod worker;

pub use config::{Credentials, RunnerConfig, TelemetryConfig};
pub use consumer::Outcome;
pub use context::{ExperimentInfo, ParamsetContext, active_experiment, current};
pub use runner::{RunReport, Runner};
