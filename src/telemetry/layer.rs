//! # `tracing` layer forwarding log records to the telemetry monitor.
//!
//! [`RemoteLogLayer`] is installed once with the subscriber (see
//! [`init_logging`](crate::logging::init_logging)). It stays inert until a
//! [`TelemetryMonitor`](super::TelemetryMonitor) installs its channel for the
//! duration of a run.

use std::fmt::Write as _;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::core::{active_experiment, current};

use super::sink::LogRecord;

static SENDER: RwLock<Option<mpsc::UnboundedSender<LogRecord>>> = RwLock::new(None);

/// Targets never forwarded (the transport's own logs).
const SKIPPED_TARGETS: [&str; 5] = ["expvisor::telemetry", "reqwest", "hyper", "h2", "rustls"];

pub(crate) fn install_sender(tx: mpsc::UnboundedSender<LogRecord>) {
    *SENDER.write().unwrap_or_else(|e| e.into_inner()) = Some(tx);
}

pub(crate) fn clear_sender() {
    *SENDER.write().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Forwards every enabled event as a [`LogRecord`] while a run is monitored.
#[derive(Debug, Default, Clone)]
pub struct RemoteLogLayer {
    /// Fixed channel; `None` uses the one installed by the monitor.
    sender: Option<mpsc::UnboundedSender<LogRecord>>,
}

impl RemoteLogLayer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_sender(tx: mpsc::UnboundedSender<LogRecord>) -> Self {
        Self { sender: Some(tx) }
    }

    fn forward(&self, record: LogRecord) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(record);
            return;
        }
        let slot = SENDER.read().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = slot.as_ref() {
            let _ = tx.send(record);
        }
    }

    fn is_active(&self) -> bool {
        self.sender.is_some() || SENDER.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl<S: Subscriber> Layer<S> for RemoteLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if SKIPPED_TARGETS.iter().any(|t| meta.target().starts_with(t)) {
            return;
        }
        if !self.is_active() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let run = active_experiment();
        let now = run.as_ref().map_or_else(crate::events::now, |r| r.now());
        let record = LogRecord {
            timestamp_string: now.format("%Y-%m-%dT%H:%M:%S.0Z").to_string(),
            timestamp: now.format("%Y-%m-%d-%H:%M:%S").to_string(),
            experiment_name: run.as_ref().map(|r| r.name.to_string()),
            experiment_version: run.as_ref().map(|r| r.version.to_string()),
            logger: meta.target().to_string(),
            config_name: current().map(|c| c.paramset().to_string()),
            filename: meta.file().map(str::to_string),
            function_name: meta.module_path().map(str::to_string),
            line_number: meta.line(),
            level: meta.level().to_string(),
            level_value: level_value(meta.level()),
            message: visitor.finish(),
            stack_info: None,
        };
        self.forward(record);
    }
}

/// Numeric levels as understood by the backend.
fn level_value(level: &Level) -> u32 {
    match *level {
        Level::ERROR => 40,
        Level::WARN => 30,
        Level::INFO => 20,
        Level::DEBUG => 10,
        Level::TRACE => 5,
    }
}

/// Renders `message` followed by ` key=value` pairs.
#[derive(Default)]
pub(crate) struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    pub(crate) fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
