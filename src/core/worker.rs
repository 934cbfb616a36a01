//! # Run one paramset.
//!
//! Executes the experiment body for one [`Paramset`] inside a worker task and
//! publishes its lifecycle to the [`Bus`].
//!
//! ## Event flow
//! ```text
//! acquire permit → plugins.paramset_start → ParamsetStart → body
//!   Ok(value)  → plugins.paramset_finish(None)  → ParamsetSuccess(value) ┐
//!   Err / panic → plugins.paramset_finish(err)  → ParamsetError(err)     ├→ ParamsetEnd
//!   aborted / unwound before an outcome         → ParamsetError          ┘
//! ```
//!
//! ## Rules
//! - Publishes **exactly one** `ParamsetEnd` per paramset, from a drop guard, so
//!   the count-based consumer always terminates.
//! - Body errors and panics never escape the wrapper.
//! - Each worker owns its plugin copies and its [`ParamsetContext`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::core::context::{self, ExperimentInfo, ParamsetContext};
use crate::error::{ErrorInfo, ExperimentError};
use crate::events::{Bus, Emitter, EventKind};
use crate::experiment::{ExperimentBody, Paramset};
use crate::listeners::panic_message;
use crate::plugins::PluginSet;

/// Everything a worker needs; plain data plus a bus handle.
pub(crate) struct WorkerParams {
    pub info: Arc<ExperimentInfo>,
    pub paramset: Paramset,
    pub body: Arc<dyn ExperimentBody>,
    pub plugins: PluginSet,
    pub bus: Bus,
    pub semaphore: Arc<Semaphore>,
}

/// Emits `ParamsetEnd` on drop, preceded by `ParamsetError` if no outcome was reported.
struct EndGuard {
    emitter: Emitter,
    reported: bool,
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        if !self.reported {
            self.emitter.paramset_error(ErrorInfo::new(
                "paramset worker stopped before reporting an outcome",
                "",
            ));
        }
        self.emitter.paramset_event(EventKind::ParamsetEnd);
    }
}

/// Runs the body for one paramset; never fails.
pub(crate) async fn run_paramset(params: WorkerParams) {
    let span = tracing::info_span!(
        "paramset",
        experiment = %params.info.name,
        paramset = %params.paramset.name
    );
    run_inner(params).instrument(span).await
}

async fn run_inner(params: WorkerParams) {
    let WorkerParams {
        info,
        paramset,
        body,
        mut plugins,
        bus,
        semaphore,
    } = params;

    let name: Arc<str> = Arc::from(paramset.name.as_str());
    let emitter = Emitter::new(bus, Arc::clone(&info.name), Arc::clone(&name))
        .with_utc_offset(info.utc_offset_secs);
    let mut guard = EndGuard {
        emitter: emitter.clone(),
        reported: false,
    };

    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_closed) => {
            tracing::error!(target: "expvisor::worker", "worker pool closed before the paramset started");
            return;
        }
    };

    let ctx = ParamsetContext::new(info, name, emitter.clone());
    let params = paramset.params;
    let call = {
        let ctx = ctx.clone();
        let params = params.clone();
        async move { body.call(ctx, params).await }
    };

    context::scope(ctx.clone(), async {
        plugins.paramset_start(&ctx, &params).await;

        emitter.paramset_event(EventKind::ParamsetStart);
        tracing::info!(target: "expvisor::worker", "started paramset");
        let started = Instant::now();

        let res = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(ExperimentError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        };

        match res {
            Ok(value) => {
                tracing::info!(target: "expvisor::worker", took = ?started.elapsed(), "finished paramset");
                plugins.paramset_finish(&ctx, None).await;
                emitter.paramset_success(value);
            }
            Err(err) => {
                let info = err.to_info();
                tracing::error!(
                    target: "expvisor::worker",
                    took = ?started.elapsed(),
                    kind = err.as_label(),
                    error = %err,
                    "paramset failed"
                );
                plugins.paramset_finish(&ctx, Some(&info)).await;
                emitter.paramset_error(info);
            }
        }
        guard.reported = true;
    })
    .await;
}
