//! # Run and worker context.
//!
//! Two ambient slots exist:
//! - the **active run** ([`active_experiment`]): process-wide, installed by the
//!   runner at start through an [`ActiveRun`] guard and cleared when the guard drops;
//! - the **current paramset** ([`current`]): task-local, set by the worker wrapper
//!   around the experiment body.
//!
//! The body also receives its [`ParamsetContext`] explicitly; the ambient lookup
//! exists for code that cannot thread it through (log layers, deep helpers).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::events::Emitter;

/// Identity of a run, shared by every worker.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentInfo {
    pub name: Arc<str>,
    pub version: Arc<str>,
    /// Paramset names in definition order.
    pub paramsets: Arc<[String]>,
    /// Registered step names.
    pub steps: Arc<[String]>,
    pub n_jobs: usize,
    pub cache_dir: PathBuf,
    /// Seconds east of UTC for this run's timestamps.
    pub utc_offset_secs: i32,
}

impl ExperimentInfo {
    /// Current time in this run's offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        crate::events::now_in(self.utc_offset_secs)
    }
}

/// Context of one paramset execution.
///
/// Built from plain data inside the worker; cheap to clone.
#[derive(Debug, Clone)]
pub struct ParamsetContext {
    info: Arc<ExperimentInfo>,
    paramset: Arc<str>,
    emitter: Emitter,
}

impl ParamsetContext {
    pub(crate) fn new(info: Arc<ExperimentInfo>, paramset: Arc<str>, emitter: Emitter) -> Self {
        Self {
            info,
            paramset,
            emitter,
        }
    }

    pub fn experiment(&self) -> &str {
        &self.info.name
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn paramset(&self) -> &str {
        &self.paramset
    }

    /// Every paramset name of the run.
    pub fn paramsets(&self) -> &[String] {
        &self.info.paramsets
    }

    pub fn cache_dir(&self) -> &Path {
        &self.info.cache_dir
    }

    pub fn info(&self) -> &ExperimentInfo {
        &self.info
    }

    pub(crate) fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

tokio::task_local! {
    static CURRENT: ParamsetContext;
}

/// Context of the paramset the calling task executes, if any.
pub fn current() -> Option<ParamsetContext> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Runs `fut` with `ctx` as the task-local current context.
pub(crate) async fn scope<F: Future>(ctx: ParamsetContext, fut: F) -> F::Output {
    CURRENT.scope(ctx, fut).await
}

static RUN_IDS: AtomicU64 = AtomicU64::new(1);
static ACTIVE: RwLock<Option<(u64, ExperimentInfo)>> = RwLock::new(None);

/// The run currently installed in this process, if any.
pub fn active_experiment() -> Option<ExperimentInfo> {
    let slot = ACTIVE.read().unwrap_or_else(|e| e.into_inner());
    slot.as_ref().map(|(_, info)| info.clone())
}

/// Installs a run in the process-wide slot; clears it on drop.
///
/// Dropping only clears the slot if it still holds this run.
pub(crate) struct ActiveRun {
    id: u64,
}

impl ActiveRun {
    pub(crate) fn install(info: ExperimentInfo) -> Self {
        let id = RUN_IDS.fetch_add(1, Ordering::Relaxed);
        let mut slot = ACTIVE.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some((id, info));
        Self { id }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let mut slot = ACTIVE.write().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((id, _)) if *id == self.id) {
            *slot = None;
        }
    }
}
