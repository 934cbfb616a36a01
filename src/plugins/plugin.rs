//! # Plugin capability.
//!
//! A [`Plugin`] hooks into the run lifecycle:
//!
//! ```text
//! coordinator:  experiment_initialize ─────────────────────────────► experiment_finish
//! worker (per paramset, own clone):  paramset_start ─► body ─► paramset_finish
//! ```
//!
//! Every worker gets its own copy through [`Plugin::clone_box`], so hooks take
//! `&mut self` without any locking. Hook errors and panics are logged and never
//! abort the run.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use expvisor::{ErrorInfo, ParamsetContext, Params, Plugin, PluginError};
//!
//! #[derive(Clone, Default)]
//! struct Timer {
//!     started: Option<std::time::Instant>,
//! }
//!
//! #[async_trait]
//! impl Plugin for Timer {
//!     fn name(&self) -> &str { "timer" }
//!
//!     async fn paramset_start(&mut self, _ctx: &ParamsetContext, _params: &Params) -> Result<(), PluginError> {
//!         self.started = Some(std::time::Instant::now());
//!         Ok(())
//!     }
//!
//!     async fn paramset_finish(&mut self, ctx: &ParamsetContext, _error: Option<&ErrorInfo>) -> Result<(), PluginError> {
//!         if let Some(t) = self.started {
//!             tracing::info!(paramset = ctx.paramset(), took = ?t.elapsed(), "paramset timed");
//!         }
//!         Ok(())
//!     }
//!
//!     fn clone_box(&self) -> Box<dyn Plugin> { Box::new(self.clone()) }
//! }
//! ```

use async_trait::async_trait;

use crate::core::{ExperimentInfo, ParamsetContext};
use crate::error::{ErrorInfo, PluginError};
use crate::experiment::Params;

/// Lifecycle hooks. Every hook defaults to a no-op.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique name within one experiment.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Runs once on the coordinator before any paramset starts.
    async fn experiment_initialize(&mut self, _info: &ExperimentInfo) -> Result<(), PluginError> {
        Ok(())
    }

    /// Runs once on the coordinator after the run ended (also after a kill).
    async fn experiment_finish(&mut self, _info: &ExperimentInfo) -> Result<(), PluginError> {
        Ok(())
    }

    /// Runs in the worker before the body.
    async fn paramset_start(
        &mut self,
        _ctx: &ParamsetContext,
        _params: &Params,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Runs in the worker after the body; `error` is set when the body failed.
    async fn paramset_finish(
        &mut self,
        _ctx: &ParamsetContext,
        _error: Option<&ErrorInfo>,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Independent copy for one worker.
    fn clone_box(&self) -> Box<dyn Plugin>;
}
