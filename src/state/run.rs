//! # Run state machine.
//!
//! [`RunState`] folds generic lifecycle events into a snapshot of the whole run:
//! per-paramset and per-step status, aggregate `running` / `finished` / `failed`
//! lists, results and errors.
//!
//! ## Transitions
//! ```text
//! ExperimentStart   ─► status = Running,        started_at
//! ExperimentSuccess ─► status = Successful,     finished_at
//! ExperimentEnd     ─► Running ⇒ EndedWithErrors, finished_at if unset
//! ParamsetStart     ─► paramset Running,        running += name
//! ParamsetSuccess   ─► paramset Successful,     running → finished, results[name]
//! ParamsetError     ─► paramset Failed,         running → failed,   errors += error
//! StepStart         ─► step Running,            current_step = step
//! StepSuccess       ─► step Successful
//! StepError         ─► step Failed
//! ParamsetEnd / StepEnd ─► no change
//! ```
//!
//! ## Rules
//! - Specific (owner-named) copies are ignored.
//! - Paramset and step keys are fixed at construction; unknown names are errors.
//! - Transitions are idempotent.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::{ErrorInfo, StateError};
use crate::events::{Event, EventKind};

/// Status of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    /// Every paramset succeeded.
    Successful,
    /// All paramsets ended and at least one failed.
    EndedWithErrors,
    /// The coordinator itself failed.
    Failed,
    /// The run was interrupted.
    Killed,
}

impl RunStatus {
    /// True once the run can no longer change status on its own.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::NotStarted | RunStatus::Running)
    }
}

/// Status of one paramset or one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotStarted,
    Running,
    Successful,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Successful | Status::Failed)
    }
}

/// State of one step inside one paramset.
#[derive(Debug, Clone, Serialize)]
pub struct StepState {
    pub status: Status,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    pub error: Option<ErrorInfo>,
}

impl StepState {
    fn new() -> Self {
        Self {
            status: Status::NotStarted,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// State of one paramset.
#[derive(Debug, Clone, Serialize)]
pub struct ParamsetState {
    pub status: Status,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    /// Last step that started.
    pub current_step: Option<String>,
    pub error: Option<ErrorInfo>,
    /// Keyed by registered step name.
    pub steps: BTreeMap<String, StepState>,
}

impl ParamsetState {
    fn new(steps: &[String]) -> Self {
        Self {
            status: Status::NotStarted,
            started_at: None,
            finished_at: None,
            current_step: None,
            error: None,
            steps: steps.iter().map(|s| (s.clone(), StepState::new())).collect(),
        }
    }
}

/// Snapshot of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub experiment: String,
    pub version: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    /// Registered step names, in registration order.
    pub steps: Vec<String>,
    /// Keyed by paramset name.
    pub paramsets: BTreeMap<String, ParamsetState>,
    pub running: Vec<String>,
    pub finished: Vec<String>,
    pub failed: Vec<String>,
    /// Body results of successful paramsets.
    pub results: HashMap<String, serde_json::Value>,
    /// Errors of failed paramsets, in arrival order.
    pub errors: Vec<ErrorInfo>,
}

impl RunState {
    /// Creates the state with fixed paramset and step keys.
    pub fn new(
        experiment: impl Into<String>,
        version: impl Into<String>,
        paramsets: &[String],
        steps: &[String],
    ) -> Self {
        Self {
            experiment: experiment.into(),
            version: version.into(),
            status: RunStatus::NotStarted,
            started_at: None,
            finished_at: None,
            steps: steps.to_vec(),
            paramsets: paramsets
                .iter()
                .map(|p| (p.clone(), ParamsetState::new(steps)))
                .collect(),
            running: Vec::new(),
            finished: Vec::new(),
            failed: Vec::new(),
            results: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Applies one event.
    pub fn apply(&mut self, ev: &Event) -> Result<(), StateError> {
        if !ev.is_generic() {
            return Ok(());
        }
        let at = ev.at;

        match ev.kind {
            EventKind::ExperimentStart => {
                self.status = RunStatus::Running;
                self.started_at = Some(at);
            }
            EventKind::ExperimentSuccess => {
                self.status = RunStatus::Successful;
                self.finished_at = Some(at);
            }
            EventKind::ExperimentEnd => {
                if self.status == RunStatus::Running {
                    self.status = RunStatus::EndedWithErrors;
                }
                self.finished_at.get_or_insert(at);
            }
            EventKind::ParamsetStart => {
                let name = paramset_name(ev)?;
                let ps = self.paramset_mut(name)?;
                ps.status = Status::Running;
                ps.started_at = Some(at);
                push_unique(&mut self.running, name);
            }
            EventKind::ParamsetSuccess => {
                let name = paramset_name(ev)?;
                let ps = self.paramset_mut(name)?;
                ps.status = Status::Successful;
                ps.finished_at = Some(at);
                if let Some(result) = &ev.result {
                    self.results.insert(name.to_string(), result.clone());
                }
                self.running.retain(|p| p != name);
                push_unique(&mut self.finished, name);
            }
            EventKind::ParamsetError => {
                let name = paramset_name(ev)?;
                let ps = self.paramset_mut(name)?;
                let first = ps.status != Status::Failed;
                ps.status = Status::Failed;
                ps.error = ev.error.clone();
                ps.finished_at = Some(at);
                if first {
                    if let Some(error) = &ev.error {
                        self.errors.push(error.clone());
                    }
                }
                self.running.retain(|p| p != name);
                push_unique(&mut self.failed, name);
            }
            EventKind::StepStart => {
                let (paramset, step) = step_names(ev)?;
                let ps = self.paramset_mut(paramset)?;
                ps.current_step = Some(step.to_string());
                let st = step_mut(ps, paramset, step)?;
                st.status = Status::Running;
                st.started_at = Some(at);
            }
            EventKind::StepSuccess => {
                let (paramset, step) = step_names(ev)?;
                let st = step_mut(self.paramset_mut(paramset)?, paramset, step)?;
                st.status = Status::Successful;
                st.finished_at = Some(at);
            }
            EventKind::StepError => {
                let (paramset, step) = step_names(ev)?;
                let st = step_mut(self.paramset_mut(paramset)?, paramset, step)?;
                st.status = Status::Failed;
                st.error = ev.error.clone();
                st.finished_at = Some(at);
            }
            EventKind::ParamsetEnd | EventKind::StepEnd => {}
        }
        Ok(())
    }

    /// Marks the run as interrupted.
    pub fn mark_killed(&mut self, at: DateTime<FixedOffset>) {
        self.status = RunStatus::Killed;
        self.finished_at = Some(at);
    }

    /// True if any paramset failed.
    pub fn has_errors(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Number of paramsets in a terminal status.
    pub fn completed(&self) -> usize {
        self.finished.len() + self.failed.len()
    }

    /// Serializable snapshot for reporting.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn paramset_mut(&mut self, name: &str) -> Result<&mut ParamsetState, StateError> {
        self.paramsets
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownParamset(name.to_string()))
    }
}

fn paramset_name(ev: &Event) -> Result<&str, StateError> {
    ev.paramset.as_deref().ok_or(StateError::MissingField {
        kind: ev.kind.as_str(),
        field: "paramset",
    })
}

fn step_names(ev: &Event) -> Result<(&str, &str), StateError> {
    let paramset = paramset_name(ev)?;
    let step = ev.step.as_deref().ok_or(StateError::MissingField {
        kind: ev.kind.as_str(),
        field: "step",
    })?;
    Ok((paramset, step))
}

fn step_mut<'a>(
    ps: &'a mut ParamsetState,
    paramset: &str,
    step: &str,
) -> Result<&'a mut StepState, StateError> {
    ps.steps.get_mut(step).ok_or_else(|| StateError::UnknownStep {
        paramset: paramset.to_string(),
        step: step.to_string(),
    })
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|p| p == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new(
            "exp",
            "v1",
            &["a".to_string(), "b".to_string()],
            &["fit".to_string(), "eval".to_string()],
        )
    }

    fn ps(kind: EventKind, name: &str) -> Event {
        Event::paramset(kind, "exp", name)
    }

    #[test]
    fn test_success_moves_running_to_finished() {
        let mut st = state();
        st.apply(&Event::experiment(EventKind::ExperimentStart, "exp"))
            .unwrap();
        st.apply(&ps(EventKind::ParamsetStart, "a")).unwrap();
        assert_eq!(st.running, vec!["a"]);

        st.apply(&ps(EventKind::ParamsetSuccess, "a").with_result(serde_json::json!(1)))
            .unwrap();
        assert!(st.running.is_empty());
        assert_eq!(st.finished, vec!["a"]);
        assert_eq!(st.results["a"], serde_json::json!(1));
        assert_eq!(st.paramsets["a"].status, Status::Successful);
    }

    #[test]
    fn test_error_is_recorded_once() {
        let mut st = state();
        let err = ps(EventKind::ParamsetError, "b").with_error(ErrorInfo::new("boom", ""));
        st.apply(&ps(EventKind::ParamsetStart, "b")).unwrap();
        st.apply(&err).unwrap();
        st.apply(&err).unwrap();

        assert_eq!(st.failed, vec!["b"]);
        assert_eq!(st.errors.len(), 1);
        assert!(st.has_errors());
        assert_eq!(st.paramsets["b"].error.as_ref().unwrap().message, "boom");
    }

    #[test]
    fn test_step_transitions_and_current_step() {
        let mut st = state();
        st.apply(&Event::step(EventKind::StepStart, "exp", "a", "fit"))
            .unwrap();
        assert_eq!(st.paramsets["a"].current_step.as_deref(), Some("fit"));
        assert_eq!(st.paramsets["a"].steps["fit"].status, Status::Running);

        st.apply(
            &Event::step(EventKind::StepError, "exp", "a", "fit")
                .with_error(ErrorInfo::new("nan loss", "")),
        )
        .unwrap();
        let fit = &st.paramsets["a"].steps["fit"];
        assert_eq!(fit.status, Status::Failed);
        assert!(fit.status.is_terminal());
        assert_eq!(st.paramsets["a"].steps["eval"].status, Status::NotStarted);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut st = state();
        assert_eq!(
            st.apply(&ps(EventKind::ParamsetStart, "zzz")),
            Err(StateError::UnknownParamset("zzz".into()))
        );
        assert_eq!(
            st.apply(&Event::step(EventKind::StepStart, "exp", "a", "nope")),
            Err(StateError::UnknownStep {
                paramset: "a".into(),
                step: "nope".into()
            })
        );
    }

    #[test]
    fn test_specific_copies_do_not_change_state() {
        let mut st = state();
        st.apply(&ps(EventKind::ParamsetStart, "a").to_specific())
            .unwrap();
        assert!(st.running.is_empty());
    }

    #[test]
    fn test_end_after_errors_and_after_kill() {
        let mut st = state();
        st.apply(&Event::experiment(EventKind::ExperimentStart, "exp"))
            .unwrap();
        st.apply(&Event::experiment(EventKind::ExperimentEnd, "exp"))
            .unwrap();
        assert_eq!(st.status, RunStatus::EndedWithErrors);

        let mut killed = state();
        killed
            .apply(&Event::experiment(EventKind::ExperimentStart, "exp"))
            .unwrap();
        killed.mark_killed(crate::events::now());
        killed
            .apply(&Event::experiment(EventKind::ExperimentEnd, "exp"))
            .unwrap();
        assert_eq!(killed.status, RunStatus::Killed);
    }

    #[test]
    fn test_to_json_snapshot() {
        let st = state();
        let json = st.to_json();
        assert_eq!(json["status"], "not_started");
        assert_eq!(json["paramsets"]["a"]["steps"]["fit"]["status"], "not_started");
    }
}
