//! Error types used by the expvisor runtime, experiment bodies and the cache.
//!
//! This module defines the main error enums:
//!
//! - [`RunError`]: errors raised by the run coordinator itself (mostly setup).
//! - [`ExperimentError`]: errors raised by experiment bodies and steps.
//! - [`PluginError`]: errors raised by plugin hooks (always contained).
//! - [`StoreError`]: errors raised by the variable store.
//! - [`StateError`]: broken run-state invariants.
//! - [`TelemetryError`]: remote telemetry failures (always contained).
//!
//! The enums with a wide audience provide `as_label` for logs/metrics.

use std::backtrace::Backtrace;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Errors produced by the run coordinator.
///
/// Configuration variants are raised before any worker is spawned. A run that
/// was killed or had failing paramsets is **not** an error: inspect
/// [`RunReport`](crate::RunReport) instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// The experiment was built without any paramset.
    #[error("no paramsets were passed to experiment {experiment:?}")]
    NoParamsets {
        /// Experiment name.
        experiment: String,
    },

    /// Two paramsets share the same name.
    #[error("duplicate paramset name {name:?}")]
    DuplicateParamset {
        /// The duplicated name.
        name: String,
    },

    /// Two plugins share the same name.
    #[error("duplicate plugin name {name:?}")]
    DuplicatePlugin {
        /// The duplicated name.
        name: String,
    },

    /// The experiment builder was finished without a body function.
    #[error("experiment {experiment:?} has no function")]
    MissingFunction {
        /// Experiment name.
        experiment: String,
    },

    /// Every producer went away before all paramsets reported their end.
    #[error("event bus closed after {seen} of {expected} paramset ends")]
    BusClosed {
        /// Paramset ends observed.
        seen: usize,
        /// Paramset ends expected.
        expected: usize,
    },

    /// Installing the OS signal handlers failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] io::Error),
}

impl RunError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use expvisor::RunError;
    ///
    /// let err = RunError::NoParamsets { experiment: "demo".into() };
    /// assert_eq!(err.as_label(), "run_no_paramsets");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::NoParamsets { .. } => "run_no_paramsets",
            RunError::DuplicateParamset { .. } => "run_duplicate_paramset",
            RunError::DuplicatePlugin { .. } => "run_duplicate_plugin",
            RunError::MissingFunction { .. } => "run_missing_function",
            RunError::BusClosed { .. } => "run_bus_closed",
            RunError::Signal(_) => "run_signal",
        }
    }

    /// True for errors detected while validating the experiment definition.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, RunError::BusClosed { .. } | RunError::Signal(_))
    }
}

/// # Errors produced by experiment bodies and steps.
///
/// A [`Step`](ExperimentError::Step) error aborts the enclosing paramset body
/// (propagate it with `?`). Any error returned from the body is caught by the
/// worker and reported as a `ParamsetError` event.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ExperimentError {
    /// A step failed; carries the step name and the captured trace.
    #[error("step {step:?} failed: {message}")]
    Step {
        /// Step name.
        step: String,
        /// Failure message of the step body.
        message: String,
        /// Backtrace captured when the step failure was recorded.
        stack_trace: String,
    },

    /// The body (or a step body) failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The body panicked; the panic was caught by the worker.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// A parameter was missing or had an unexpected shape.
    #[error("invalid parameter {name:?}: {reason}")]
    InvalidParam {
        /// Parameter name (or `"*"` for the whole set).
        name: String,
        /// What went wrong.
        reason: String,
    },
}

impl ExperimentError {
    /// Shorthand for [`ExperimentError::Fail`].
    pub fn fail(error: impl ToString) -> Self {
        ExperimentError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExperimentError::Step { .. } => "experiment_step_failed",
            ExperimentError::Fail { .. } => "experiment_failed",
            ExperimentError::Panicked { .. } => "experiment_panicked",
            ExperimentError::InvalidParam { .. } => "experiment_invalid_param",
        }
    }

    /// Renders the error into an [`ErrorInfo`] for events.
    ///
    /// Step errors keep the trace recorded by the step wrapper; other variants
    /// capture one here (honours `RUST_BACKTRACE`).
    pub fn to_info(&self) -> ErrorInfo {
        match self {
            ExperimentError::Step { stack_trace, .. } => ErrorInfo {
                message: self.to_string(),
                stack_trace: stack_trace.clone(),
            },
            _ => ErrorInfo::capture(self.to_string()),
        }
    }
}

impl From<StoreError> for ExperimentError {
    fn from(err: StoreError) -> Self {
        ExperimentError::Fail {
            error: err.to_string(),
        }
    }
}

/// Error payload carried by `ParamsetError` / `StepError` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable message.
    pub message: String,
    /// Rendered backtrace (may be a "disabled backtrace" marker).
    pub stack_trace: String,
}

impl ErrorInfo {
    /// Creates an error payload with an explicit trace.
    pub fn new(message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    /// Creates an error payload and captures the current backtrace.
    pub fn capture(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: Backtrace::capture().to_string(),
        }
    }
}

/// # Errors produced by plugin hooks.
///
/// Always caught at the call site and logged; never escalated.
#[derive(Error, Debug)]
#[error("plugin {plugin:?} failed in {hook}: {error}")]
pub struct PluginError {
    /// Plugin name.
    pub plugin: String,
    /// Hook name (`experiment_initialize`, `paramset_start`, ...).
    pub hook: &'static str,
    /// The underlying error message.
    pub error: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, error: impl ToString) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            error: error.to_string(),
        }
    }
}

/// # Errors produced by the variable store.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The variable was never written in this scope.
    #[error("name {name:?} is not defined")]
    NotFound {
        /// Variable name.
        name: String,
    },

    /// `set` was called on a read-only handle.
    #[error("store is read-only")]
    ReadOnly,

    /// No store was ever written for this experiment version and paramset.
    #[error("no store exists for version {version:?} and paramset {paramset:?}")]
    NoSuchScope {
        /// Experiment version.
        version: String,
        /// Paramset name.
        paramset: String,
    },

    /// A version, paramset or variable name cannot be used as a path component.
    #[error("{name:?} is not a valid store path component")]
    InvalidName {
        /// Offending name.
        name: String,
    },

    /// The value could not be (de)serialized.
    #[error("codec error for {name:?}: {source}")]
    Codec {
        /// Variable name.
        name: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Durable storage failed.
    #[error("store io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "store_not_found",
            StoreError::ReadOnly => "store_read_only",
            StoreError::NoSuchScope { .. } => "store_no_such_scope",
            StoreError::InvalidName { .. } => "store_invalid_name",
            StoreError::Codec { .. } => "store_codec",
            StoreError::Io(_) => "store_io",
        }
    }

    /// True for a miss (never written), as opposed to a storage failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// # Broken run-state invariants.
///
/// These must never occur for events produced by the runtime: paramset and
/// step keys are fixed when the run state is built.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    /// Event names a paramset that is not part of the run.
    #[error("unknown paramset {0:?}")]
    UnknownParamset(String),
    /// Event names a step that was never registered.
    #[error("unknown step {step:?} in paramset {paramset:?}")]
    UnknownStep {
        /// Paramset name.
        paramset: String,
        /// Step name.
        step: String,
    },
    /// Paramset/step-scoped event without the matching identifier.
    #[error("{kind} event without {field}")]
    MissingField {
        /// Event kind label.
        kind: &'static str,
        /// Missing field name.
        field: &'static str,
    },
}

/// # Remote telemetry failures.
///
/// Always logged locally and swallowed by the telemetry monitor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Transport-level failure.
    #[cfg(feature = "telemetry")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an unexpected status.
    #[error("server returned {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body.
        body: String,
    },

    /// The remote run could not be created, so there is nowhere to send data.
    #[error("no remote run id")]
    NoRunId,
}
