//! # Experiment definition.
//!
//! An [`Experiment`] bundles everything a run needs: name and version, the
//! paramsets, the body, registered steps, plugins and extra listeners. Build one
//! with [`Experiment::builder`] and start it with [`Experiment::run`].
//!
//! ## Example
//! ```rust,no_run
//! use expvisor::{Experiment, ExperimentError, ParamsetContext, Params, RunnerConfig, RunStatus};
//!
//! # async fn demo() -> Result<(), expvisor::RunError> {
//! let exp = Experiment::builder("square")
//!     .version("1")
//!     .paramset("two", serde_json::json!({"x": 2}))
//!     .paramset("three", serde_json::json!({"x": 3}))
//!     .function(|_ctx: ParamsetContext, p: Params| async move {
//!         let x: i64 = p.get("x")?;
//!         Ok::<_, ExperimentError>(serde_json::json!(x * x))
//!     })
//!     .build()?;
//!
//! let report = exp.run(RunnerConfig::default()).await?;
//! assert_eq!(report.status, RunStatus::Successful);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{RunReport, Runner, RunnerConfig};
use crate::error::RunError;
use crate::listeners::ListenerRegistry;
use crate::plugins::PluginSet;

use super::builder::ExperimentBuilder;
use super::function::ExperimentBody;
use super::paramset::Paramset;
use super::step::StepRegistry;

/// A validated experiment, ready to run.
pub struct Experiment {
    pub(crate) name: Arc<str>,
    pub(crate) version: Arc<str>,
    pub(crate) paramsets: Vec<Paramset>,
    pub(crate) n_jobs: Option<usize>,
    pub(crate) steps: StepRegistry,
    pub(crate) plugins: PluginSet,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) body: Arc<dyn ExperimentBody>,
}

impl Experiment {
    /// Starts a builder for an experiment called `name`.
    pub fn builder(name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn paramsets(&self) -> &[Paramset] {
        &self.paramsets
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    /// Runs every paramset with `cfg` and waits for the run to end.
    pub async fn run(self, cfg: RunnerConfig) -> Result<RunReport, RunError> {
        Runner::new(cfg).run(self).await
    }

    /// Like [`run`](Self::run), but also stops (as killed) when `token` is cancelled.
    pub async fn run_until(
        self,
        cfg: RunnerConfig,
        token: CancellationToken,
    ) -> Result<RunReport, RunError> {
        Runner::new(cfg).run_until(self, token).await
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("paramsets", &self.paramsets.len())
            .field("steps", &self.steps.names())
            .field("plugins", &self.plugins.names())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
