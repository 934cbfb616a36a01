//! # Steps: named, observable sub-units of an experiment body.
//!
//! Steps are registered on a [`StepRegistry`] owned by the experiment; the
//! returned [`Step`] handle wraps a future with lifecycle events.
//!
//! ## Event flow
//! ```text
//! Ok:   StepStart → [future] → StepSuccess → StepEnd      → Ok(value)
//! Err:  StepStart → [future] → StepError   → StepEnd      → Err(ExperimentError::Step)
//! panic: StepStart → [future] → StepError   → StepEnd      → Err(ExperimentError::Step)
//! ```
//! Each event is published generic and as `{step}__{SUFFIX}`.
//!
//! ## Example
//! ```rust
//! use expvisor::{ExperimentError, ParamsetContext, StepRegistry};
//!
//! let mut steps = StepRegistry::new();
//! let train = steps.register("train");
//! assert_eq!(steps.register("train").name(), train.name());
//!
//! async fn body(ctx: ParamsetContext, train: expvisor::Step) -> Result<f64, ExperimentError> {
//!     let loss = train.run(&ctx, async { Ok::<_, String>(0.25) }).await?;
//!     Ok(loss)
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::Instrument;

use crate::core::ParamsetContext;
use crate::error::{ErrorInfo, ExperimentError};
use crate::events::EventKind;
use crate::listeners::panic_message;

/// Handle to a registered step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    name: Arc<str>,
}

impl Step {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `fut` as this step inside the paramset `ctx`.
    ///
    /// On failure or panic the error is logged and returned as
    /// [`ExperimentError::Step`], so `?` aborts the enclosing body and no later
    /// step starts.
    pub async fn run<T, E, F>(&self, ctx: &ParamsetContext, fut: F) -> Result<T, ExperimentError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let emitter = ctx.emitter();
        let span = tracing::info_span!("step", step = %self.name);

        emitter.step_event(EventKind::StepStart, &self.name, None);
        let started = Instant::now();
        tracing::info!(
            target: "expvisor::step",
            parent: &span,
            paramset = ctx.paramset(),
            "started step"
        );

        let outcome = match AssertUnwindSafe(fut.instrument(span.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(panic) => Err(format!("step panicked: {}", panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(value) => {
                tracing::info!(
                    target: "expvisor::step",
                    parent: &span,
                    paramset = ctx.paramset(),
                    took = ?started.elapsed(),
                    "finished step"
                );
                emitter.step_event(EventKind::StepSuccess, &self.name, None);
                emitter.step_event(EventKind::StepEnd, &self.name, None);
                Ok(value)
            }
            Err(message) => {
                let info = ErrorInfo::capture(message);
                tracing::error!(
                    target: "expvisor::step",
                    parent: &span,
                    paramset = ctx.paramset(),
                    took = ?started.elapsed(),
                    error = %info.message,
                    "step failed"
                );
                emitter.step_event(EventKind::StepError, &self.name, Some(info.clone()));
                emitter.step_event(EventKind::StepEnd, &self.name, None);
                Err(ExperimentError::Step {
                    step: self.name.to_string(),
                    message: info.message,
                    stack_trace: info.stack_trace,
                })
            }
        }
    }
}

/// Steps known to one experiment, in registration order.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step; a duplicate name returns the existing handle.
    pub fn register(&mut self, name: impl Into<String>) -> Step {
        let name = name.into();
        if let Some(step) = self.steps.iter().find(|s| *s.name == *name) {
            return step.clone();
        }
        let step = Step {
            name: Arc::from(name),
        };
        self.steps.push(step.clone());
        step
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::{ExperimentInfo, ParamsetContext};
    use crate::events::{Bus, Emitter, Event, EventStream};

    fn ctx() -> (ParamsetContext, EventStream) {
        let (bus, stream) = Bus::new();
        let info = Arc::new(ExperimentInfo {
            name: "exp".into(),
            version: "v".into(),
            paramsets: vec!["p".to_string()].into(),
            steps: vec!["fit".to_string()].into(),
            n_jobs: 1,
            utc_offset_secs: 0,
            cache_dir: PathBuf::from("."),
        });
        let emitter = Emitter::new(bus, Arc::clone(&info.name), "p".into());
        (ParamsetContext::new(info, "p".into(), emitter), stream)
    }

    fn drain(stream: &mut EventStream) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = stream.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = StepRegistry::new();
        let a = reg.register("fit");
        let b = reg.register("fit");
        reg.register("eval");
        assert_eq!(a, b);
        assert_eq!(reg.names(), vec!["fit", "eval"]);
        assert!(reg.get("eval").is_some());
    }

    #[tokio::test]
    async fn test_successful_step_events() {
        let (ctx, mut stream) = ctx();
        let step = StepRegistry::new().register("fit");

        let v = step.run(&ctx, async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(v, 7);

        let topics: Vec<String> = drain(&mut stream).iter().map(Event::topic).collect();
        assert_eq!(
            topics,
            vec![
                "STEP_START",
                "fit__STEP_START",
                "STEP_SUCCESS",
                "fit__STEP_SUCCESS",
                "STEP_END",
                "fit__STEP_END"
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_step_returns_step_error() {
        let (ctx, mut stream) = ctx();
        let step = StepRegistry::new().register("fit");

        let err = step
            .run(&ctx, async { Err::<(), _>("diverged") })
            .await
            .unwrap_err();
        match err {
            ExperimentError::Step { step, message, .. } => {
                assert_eq!(step, "fit");
                assert_eq!(message, "diverged");
            }
            other => panic!("unexpected error: {other}"),
        }

        let events = drain(&mut stream);
        let kinds: Vec<EventKind> = events.iter().filter(|e| e.is_generic()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::StepStart, EventKind::StepError, EventKind::StepEnd]
        );
        assert_eq!(events[2].error.as_ref().unwrap().message, "diverged");
    }

    #[tokio::test]
    async fn test_panicking_step_still_ends() {
        let (ctx, mut stream) = ctx();
        let step = StepRegistry::new().register("fit");

        let err = step
            .run(&ctx, async {
                if true {
                    panic!("nan");
                }
                Ok::<(), String>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(&err, ExperimentError::Step { step, message, .. }
            if step == "fit" && message.contains("nan")));

        let kinds: Vec<EventKind> = drain(&mut stream)
            .iter()
            .filter(|e| e.is_generic())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::StepStart, EventKind::StepError, EventKind::StepEnd]
        );
    }
}
