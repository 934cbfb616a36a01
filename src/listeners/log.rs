//! # Logging listener.
//!
//! [`LogWriter`] writes every generic lifecycle event through `tracing` under the
//! `expvisor::events` target. It is registered by the runner after the run
//! tracker and the telemetry monitor.
//!
//! ## Output format (fmt layer)
//! ```text
//! INFO expvisor::events: experiment started experiment="demo"
//! INFO expvisor::events: paramset started experiment="demo" paramset="a"
//! ERROR expvisor::events: paramset failed experiment="demo" paramset="b" error="boom"
//! INFO expvisor::events: experiment ended experiment="demo"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Listener;

/// Lifecycle event logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Listener for LogWriter {
    async fn on_event(&self, e: &Event) {
        let experiment = &*e.experiment;
        let paramset = e.paramset.as_deref().unwrap_or("");
        let step = e.step.as_deref().unwrap_or("");
        let error = e.error.as_ref().map(|err| err.message.as_str()).unwrap_or("");

        match e.kind {
            EventKind::ExperimentStart => {
                tracing::info!(target: "expvisor::events", experiment, "experiment started");
            }
            EventKind::ExperimentSuccess => {
                tracing::info!(target: "expvisor::events", experiment, "experiment succeeded");
            }
            EventKind::ExperimentEnd => {
                tracing::info!(target: "expvisor::events", experiment, "experiment ended");
            }
            EventKind::ParamsetStart => {
                tracing::info!(target: "expvisor::events", experiment, paramset, "paramset started");
            }
            EventKind::ParamsetSuccess => {
                tracing::info!(target: "expvisor::events", experiment, paramset, "paramset succeeded");
            }
            EventKind::ParamsetError => {
                tracing::error!(target: "expvisor::events", experiment, paramset, error, "paramset failed");
            }
            EventKind::ParamsetEnd => {
                tracing::debug!(target: "expvisor::events", experiment, paramset, "paramset ended");
            }
            EventKind::StepStart => {
                tracing::debug!(target: "expvisor::events", experiment, paramset, step, "step started");
            }
            EventKind::StepSuccess => {
                tracing::debug!(target: "expvisor::events", experiment, paramset, step, "step succeeded");
            }
            EventKind::StepError => {
                tracing::warn!(target: "expvisor::events", experiment, paramset, step, error, "step failed");
            }
            EventKind::StepEnd => {
                tracing::trace!(target: "expvisor::events", experiment, paramset, step, "step ended");
            }
        }
    }

    fn name(&self) -> &str {
        "log_writer"
    }
}
