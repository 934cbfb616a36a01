//! # Lifecycle events emitted by the coordinator, workers and steps.
//!
//! The [`EventKind`] enum classifies event types across three scopes:
//! - **Experiment events**: the run as a whole (start, success, end)
//! - **Paramset events**: one execution of the body (start, success, error, end)
//! - **Step events**: one named sub-unit inside the body (start, success, error, end)
//!
//! Every occurrence is published twice: once as a [`EventScope::Generic`] event
//! (topic `EXPERIMENT_PARAMSET_START`, ...) and once as a [`EventScope::Specific`]
//! event whose topic embeds the owner name (`{paramset}__PARAMSET_START`, ...).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events of one paramset arrive in emission order; events of different paramsets
//! interleave arbitrarily.
//!
//! ## Example
//! ```rust
//! use expvisor::{Event, EventKind, EventScope};
//!
//! let ev = Event::step(EventKind::StepStart, "exp", "paramset-1", "train");
//! assert_eq!(ev.topic(), "STEP_START");
//!
//! let specific = ev.to_specific();
//! assert_eq!(specific.scope, EventScope::Specific);
//! assert_eq!(specific.topic(), "train__STEP_START");
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in UTC.
pub fn now() -> DateTime<FixedOffset> {
    now_in(0)
}

/// Current wall-clock time at `offset_secs` east of UTC.
///
/// Out-of-range offsets fall back to UTC.
pub fn now_in(offset_secs: i32) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&fixed_offset(offset_secs))
}

fn fixed_offset(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // === Experiment events ===
    /// The run started.
    ///
    /// Sets: `experiment`
    ExperimentStart,

    /// All paramsets ended and none of them failed.
    ///
    /// Sets: `experiment`
    ExperimentSuccess,

    /// The run ended (after success, with errors, or killed). Always last.
    ///
    /// Sets: `experiment`
    ExperimentEnd,

    // === Paramset events ===
    /// A worker started executing the body for a paramset.
    ///
    /// Sets: `experiment`, `paramset`
    ParamsetStart,

    /// The body returned `Ok`.
    ///
    /// Sets: `experiment`, `paramset`, `result`
    ParamsetSuccess,

    /// The body returned `Err` or panicked. Always followed by `ParamsetEnd`.
    ///
    /// Sets: `experiment`, `paramset`, `error`
    ParamsetError,

    /// Terminal event of a paramset, emitted exactly once per paramset.
    ///
    /// Sets: `experiment`, `paramset`
    ParamsetEnd,

    // === Step events ===
    /// A step started.
    ///
    /// Sets: `experiment`, `paramset`, `step`
    StepStart,

    /// A step returned `Ok`. Followed by `StepEnd`.
    ///
    /// Sets: `experiment`, `paramset`, `step`
    StepSuccess,

    /// A step returned `Err` or panicked. Followed by `StepEnd`.
    ///
    /// Sets: `experiment`, `paramset`, `step`, `error`
    StepError,

    /// Terminal event of a step.
    ///
    /// Sets: `experiment`, `paramset`, `step`
    StepEnd,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [EventKind; 11] = [
        EventKind::ExperimentStart,
        EventKind::ExperimentSuccess,
        EventKind::ExperimentEnd,
        EventKind::ParamsetStart,
        EventKind::ParamsetSuccess,
        EventKind::ParamsetError,
        EventKind::ParamsetEnd,
        EventKind::StepStart,
        EventKind::StepSuccess,
        EventKind::StepError,
        EventKind::StepEnd,
    ];

    /// Topic name of the generic event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ExperimentStart => "EXPERIMENT_START",
            EventKind::ExperimentSuccess => "EXPERIMENT_SUCCESS",
            EventKind::ExperimentEnd => "EXPERIMENT_END",
            EventKind::ParamsetStart => "EXPERIMENT_PARAMSET_START",
            EventKind::ParamsetSuccess => "EXPERIMENT_PARAMSET_SUCCESS",
            EventKind::ParamsetError => "EXPERIMENT_PARAMSET_ERROR",
            EventKind::ParamsetEnd => "EXPERIMENT_PARAMSET_END",
            EventKind::StepStart => "STEP_START",
            EventKind::StepSuccess => "STEP_SUCCESS",
            EventKind::StepError => "STEP_ERROR",
            EventKind::StepEnd => "STEP_END",
        }
    }

    /// Suffix of the specific topic (`{owner}__{suffix}`).
    pub fn suffix(&self) -> &'static str {
        match self {
            EventKind::ExperimentStart => "EXPERIMENT_START",
            EventKind::ExperimentSuccess => "EXPERIMENT_SUCCESS",
            EventKind::ExperimentEnd => "EXPERIMENT_END",
            EventKind::ParamsetStart => "PARAMSET_START",
            EventKind::ParamsetSuccess => "PARAMSET_SUCCESS",
            EventKind::ParamsetError => "PARAMSET_ERROR",
            EventKind::ParamsetEnd => "PARAMSET_END",
            EventKind::StepStart => "STEP_START",
            EventKind::StepSuccess => "STEP_SUCCESS",
            EventKind::StepError => "STEP_ERROR",
            EventKind::StepEnd => "STEP_END",
        }
    }

    #[inline]
    pub fn is_paramset(&self) -> bool {
        matches!(
            self,
            EventKind::ParamsetStart
                | EventKind::ParamsetSuccess
                | EventKind::ParamsetError
                | EventKind::ParamsetEnd
        )
    }

    #[inline]
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            EventKind::StepStart | EventKind::StepSuccess | EventKind::StepError | EventKind::StepEnd
        )
    }

    /// Terminal kinds close a scope.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::ParamsetEnd | EventKind::ExperimentEnd)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two copies of an occurrence this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventScope {
    /// Topic is the kind name; seen by wildcard and kind subscribers.
    Generic,
    /// Topic is `{owner}__{suffix}`; seen by named subscribers only.
    Specific,
}

/// Lifecycle event.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp in the configured offset
/// - identifiers are set according to the [`EventKind`] scope
///
/// Build events with [`Event::experiment`], [`Event::paramset`] or [`Event::step`]
/// so that the identifier invariants hold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<FixedOffset>,
    /// Event classification.
    pub kind: EventKind,
    /// Generic or owner-specific copy.
    pub scope: EventScope,
    /// Experiment name.
    pub experiment: Arc<str>,
    /// Paramset name (paramset and step events).
    pub paramset: Option<Arc<str>>,
    /// Step name (step events).
    pub step: Option<Arc<str>>,
    /// Error payload (`ParamsetError`, `StepError`).
    pub error: Option<ErrorInfo>,
    /// Body return value (`ParamsetSuccess`).
    pub result: Option<serde_json::Value>,
}

impl Event {
    fn new(kind: EventKind, experiment: Arc<str>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: now(),
            kind,
            scope: EventScope::Generic,
            experiment,
            paramset: None,
            step: None,
            error: None,
            result: None,
        }
    }

    /// Creates an experiment-scoped event.
    pub fn experiment(kind: EventKind, experiment: impl Into<Arc<str>>) -> Self {
        debug_assert!(!kind.is_paramset() && !kind.is_step());
        Self::new(kind, experiment.into())
    }

    /// Creates a paramset-scoped event.
    pub fn paramset(
        kind: EventKind,
        experiment: impl Into<Arc<str>>,
        paramset: impl Into<Arc<str>>,
    ) -> Self {
        debug_assert!(kind.is_paramset());
        let mut ev = Self::new(kind, experiment.into());
        ev.paramset = Some(paramset.into());
        ev
    }

    /// Creates a step-scoped event.
    pub fn step(
        kind: EventKind,
        experiment: impl Into<Arc<str>>,
        paramset: impl Into<Arc<str>>,
        step: impl Into<Arc<str>>,
    ) -> Self {
        debug_assert!(kind.is_step());
        let mut ev = Self::new(kind, experiment.into());
        ev.paramset = Some(paramset.into());
        ev.step = Some(step.into());
        ev
    }

    /// Attaches an error payload.
    #[inline]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Expresses the timestamp at `offset_secs` east of UTC.
    #[inline]
    pub fn at_offset(mut self, offset_secs: i32) -> Self {
        self.at = self.at.with_timezone(&fixed_offset(offset_secs));
        self
    }

    /// Attaches the body return value.
    #[inline]
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Returns the owner-specific copy of this event with a fresh sequence number.
    pub fn to_specific(&self) -> Self {
        let mut ev = self.clone();
        ev.seq = EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        ev.scope = EventScope::Specific;
        ev
    }

    /// Name of the scope owner: step, paramset or experiment.
    pub fn owner(&self) -> &str {
        if self.kind.is_step() {
            if let Some(step) = self.step.as_deref() {
                return step;
            }
        }
        if self.kind.is_paramset() {
            if let Some(paramset) = self.paramset.as_deref() {
                return paramset;
            }
        }
        &self.experiment
    }

    /// Topic this event is delivered under.
    pub fn topic(&self) -> String {
        match self.scope {
            EventScope::Generic => self.kind.as_str().to_string(),
            EventScope::Specific => format!("{}__{}", self.owner(), self.kind.suffix()),
        }
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        matches!(self.scope, EventScope::Generic)
    }
}
