//! # expvisor
//!
//! **Expvisor** runs a scientific experiment over many named parameter sets
//! ("paramsets") on a bounded pool of async workers.
//!
//! Every run publishes lifecycle events, folds them into an observable run
//! state, hands them to user listeners and (optionally) streams logs and
//! progress to a remote telemetry backend. Intermediate values can be cached
//! per experiment version and paramset with the [`Store`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Paramset a  │   │  Paramset b  │   │  Paramset c  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runner (run coordinator)                                         │
//! │  - RunTracker (run state built from events)                       │
//! │  - ListenerRegistry (built-in + user listeners)                   │
//! │  - PluginSet (experiment hooks)                                   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    worker    │   │    worker    │   │    worker    │  (Semaphore(n_jobs))
//!     │ plugins+body │   │ plugins+body │   │ plugins+body │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ ParamsetStart    │ StepStart        │ ParamsetError
//!      │ ParamsetSuccess  │ StepSuccess      │ ParamsetEnd
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (unbounded mpsc channel)                  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  Consumer (counts N    │
//!                       │  ParamsetEnd events)   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!          RunTracker ─► TelemetryMonitor ─► LogWriter ─► user listeners
//! ```
//!
//! ### Event emission
//! Every occurrence is published twice: a generic event (topic = its kind) and
//! a specific copy whose topic is `{owner}__{KIND}`. [`Topic::Any`] and
//! [`Topic::Kind`] subscriptions see the generic events, [`Topic::Named`]
//! subscriptions see the specific copies.
//!
//! ## Features
//! | Area             | Description                                              | Key types / traits                        |
//! |------------------|----------------------------------------------------------|-------------------------------------------|
//! | **Experiments**  | Define a body, paramsets and steps.                      | [`Experiment`], [`ExperimentBuilder`]     |
//! | **Running**      | Execute on a bounded pool, cancel, inspect the outcome.  | [`Runner`], [`RunReport`]                 |
//! | **Listeners**    | React to lifecycle events.                               | [`Listener`], [`ListenerFn`], [`Topic`]   |
//! | **Run state**    | Per-paramset/step progress.                              | [`RunState`], [`RunStatus`]               |
//! | **Plugins**      | Experiment and paramset lifecycle hooks.                 | [`Plugin`]                                |
//! | **Store**        | Typed value cache per version and paramset.              | [`Store`], [`store::BlobStore`]           |
//! | **Telemetry**    | Remote logs and run progress.                            | [`telemetry::TelemetrySink`]              |
//! | **Logging**      | Console, file and per-paramset log files.                | [`init_logging`], [`logging::ParamsetLogLayer`] |
//! | **Errors**       | Typed errors for runs, bodies, store and plugins.        | [`RunError`], [`ExperimentError`]         |
//!
//! ## Optional features
//! - `telemetry` (default): HTTP telemetry backend ([`telemetry::HttpTelemetry`]).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use expvisor::{
//!     Experiment, ExperimentError, Params, ParamsetContext, RunStatus, RunnerConfig,
//!     StepRegistry,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut steps = StepRegistry::new();
//!     let square = steps.register("square");
//!
//!     let experiment = Experiment::builder("demo")
//!         .paramset("small", serde_json::json!({ "x": 2 }))
//!         .paramset("large", serde_json::json!({ "x": 12 }))
//!         .steps(steps)
//!         .function(move |ctx: ParamsetContext, params: Params| {
//!             let square = square.clone();
//!             async move {
//!                 let x: i64 = params.get("x")?;
//!                 let y = square.run(&ctx, async move { Ok::<_, ExperimentError>(x * x) }).await?;
//!                 Ok::<_, ExperimentError>(serde_json::json!(y))
//!             }
//!         })
//!         .build()?;
//!
//!     let cfg = RunnerConfig { handle_signals: false, ..RunnerConfig::default() };
//!     let report = experiment.run(cfg).await?;
//!     assert_eq!(report.status, RunStatus::Successful);
//!     assert_eq!(report.results["large"], serde_json::json!(144));
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod experiment;
mod listeners;
mod plugins;
mod state;

pub mod logging;
pub mod store;
pub mod telemetry;

// ---- Public re-exports ----

pub use core::{
    Credentials, ExperimentInfo, Outcome, ParamsetContext, RunReport, Runner, RunnerConfig,
    TelemetryConfig, active_experiment, current,
};
pub use error::{
    ErrorInfo, ExperimentError, PluginError, RunError, StateError, StoreError, TelemetryError,
};
pub use events::{Bus, Event, EventKind, EventScope, EventStream, Topic};
pub use experiment::{
    BoxBodyFuture, DEFAULT_VERSION, Experiment, ExperimentBody, ExperimentBuilder, ExperimentFn,
    Params, Paramset, Step, StepRegistry,
};
pub use listeners::{Listener, ListenerFn, ListenerRef, ListenerRegistry, LogWriter};
pub use logging::{LoggingConfig, init_logging};
pub use plugins::{Plugin, PluginSet};
pub use state::{ParamsetState, RunState, RunStatus, RunTracker, Status, StepState};
pub use store::Store;
