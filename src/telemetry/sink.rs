//! # Telemetry sink contract and payloads.
//!
//! The monitor talks to the remote backend only through [`TelemetrySink`]:
//! buffered log records ([`LogRecord`]) and partial run updates ([`RunPatch`]).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TelemetryError;

/// One forwarded log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp_string: String,
    pub timestamp: String,
    pub experiment_name: Option<String>,
    pub experiment_version: Option<String>,
    /// `tracing` target.
    pub logger: String,
    /// Paramset the record was emitted from, if any.
    pub config_name: Option<String>,
    pub filename: Option<String>,
    pub function_name: Option<String>,
    pub line_number: Option<u32>,
    pub level: String,
    pub level_value: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_info: Option<String>,
}

/// Execution summary of one paramset ("config" on the backend).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigExecution {
    pub config_name: String,
    pub steps: Vec<String>,
    pub has_errors: bool,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<i64>,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Step name → finish time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps_completed: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Partial update of the remote run. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_configs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configs_execution: Option<BTreeMap<String, ConfigExecution>>,
    /// Run end time, set once every paramset completed (or on kill).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<String>,
}

/// Remote telemetry backend.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Buffers one record until the next flush.
    fn push(&self, record: LogRecord);

    /// Sends the buffered records.
    async fn flush(&self) -> Result<(), TelemetryError>;

    /// Applies a partial update to the remote run.
    async fn patch_run(&self, patch: RunPatch) -> Result<(), TelemetryError>;
}

/// In-memory sink recording everything it receives.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    buffer: Mutex<Vec<LogRecord>>,
    flushed: Mutex<Vec<LogRecord>>,
    patches: Mutex<Vec<RunPatch>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records sent by `flush` so far.
    pub fn flushed(&self) -> Vec<LogRecord> {
        self.flushed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Patches received so far.
    pub fn patches(&self) -> Vec<RunPatch> {
        self.patches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    fn push(&self, record: LogRecord) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        let drained: Vec<LogRecord> = self
            .buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        self.flushed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(drained);
        Ok(())
    }

    async fn patch_run(&self, patch: RunPatch) -> Result<(), TelemetryError> {
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(patch);
        Ok(())
    }
}
