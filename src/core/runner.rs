//! # Runner: executes an experiment over all its paramsets.
//!
//! The [`Runner`] owns the run configuration. For every run it builds the event
//! bus, the run state tracker and the listener registry, spawns one worker per
//! paramset on a bounded pool and drives the consume loop until every paramset
//! ended or the run is cancelled.
//!
//! ## High-level architecture
//! ```text
//! Experiment ──► Runner::run_until(experiment, token)
//!
//! Preparation:
//!   - RunState(paramsets × steps) ─► RunTracker
//!   - ListenerRegistry: RunTracker, [TelemetryMonitor], LogWriter, user listeners
//!   - ActiveRun slot, plugins.experiment_initialize, ExperimentStart
//!
//! Spawn workers (JoinSet, Semaphore(n_jobs)):
//!   Paramset[0]  Paramset[1]  ...  Paramset[N-1]
//!       └──► worker::run_paramset ── publish ──► Bus
//!
//! Coordinator:
//!   select! {
//!     Consumer::consume_until(N)  ──► ExperimentSuccess? ─► ExperimentEnd
//!     token.cancelled()           ──► mark killed ─► ExperimentEnd ─► abort workers
//!   }
//!   plugins.experiment_finish, stop telemetry, clear ActiveRun ─► RunReport
//! ```
//!
//! A run that ends with failing paramsets or is killed still returns `Ok`; the
//! outcome is in [`RunReport::status`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::{
    config::RunnerConfig,
    consumer::Consumer,
    context::{ActiveRun, ExperimentInfo},
    shutdown::SignalWatcher,
    worker::{self, WorkerParams},
};
use crate::error::RunError;
use crate::events::{Bus, Event, EventKind, Topic};
use crate::experiment::Experiment;
use crate::listeners::{ListenerRegistry, LogWriter};
use crate::state::{RunState, RunStatus, RunTracker};
use crate::telemetry::{TelemetryMonitor, TelemetrySink};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment: String,
    pub version: String,
    pub status: RunStatus,
    /// Body results of successful paramsets.
    pub results: HashMap<String, serde_json::Value>,
    /// Final state snapshot.
    pub state: RunState,
}

impl RunReport {
    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Successful
    }

    /// Names of failed paramsets.
    pub fn failed(&self) -> &[String] {
        &self.state.failed
    }

    /// Names of successful paramsets.
    pub fn finished(&self) -> &[String] {
        &self.state.finished
    }
}

/// Executes experiments with one configuration.
pub struct Runner {
    cfg: RunnerConfig,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl Runner {
    pub fn new(cfg: RunnerConfig) -> Self {
        Self { cfg, sink: None }
    }

    /// Uses `sink` for telemetry instead of the HTTP backend from the config.
    pub fn with_telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    /// Runs `experiment` to completion (or until a termination signal, if enabled).
    pub async fn run(&self, experiment: Experiment) -> Result<RunReport, RunError> {
        self.run_until(experiment, CancellationToken::new()).await
    }

    /// Runs `experiment`; cancelling `token` kills the run.
    pub async fn run_until(
        &self,
        experiment: Experiment,
        token: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let Experiment {
            name,
            version,
            paramsets,
            n_jobs,
            steps,
            mut plugins,
            listeners: user_listeners,
            body,
        } = experiment;

        let jobs = n_jobs.map_or(self.cfg.jobs(), |n| n.max(1));
        let names: Vec<String> = paramsets.iter().map(|p| p.name.clone()).collect();
        let step_names = steps.names();
        let expected = names.len();

        let info = Arc::new(ExperimentInfo {
            name: Arc::clone(&name),
            version: Arc::clone(&version),
            paramsets: names.clone().into(),
            steps: step_names.clone().into(),
            n_jobs: jobs,
            cache_dir: self.cfg.cache_dir.clone(),
            utc_offset_secs: self.cfg.utc_offset_secs,
        });

        let run_token = token.child_token();
        let signals = if self.cfg.handle_signals {
            Some(SignalWatcher::install()?.spawn(run_token.clone()))
        } else {
            None
        };

        let tracker = RunTracker::new(RunState::new(&*name, &*version, &names, &step_names));
        let monitor = self.start_telemetry(&info, &tracker).await;

        let mut listeners = ListenerRegistry::new();
        listeners.subscribe(Topic::Any, Arc::new(tracker.clone()));
        if let Some(m) = &monitor {
            listeners.subscribe(Topic::Any, m.clone());
        }
        listeners.subscribe(Topic::Any, Arc::new(LogWriter::new()));
        listeners.extend(user_listeners);

        let active = ActiveRun::install((*info).clone());
        tracing::info!(
            target: "expvisor::runner",
            experiment = %name,
            version = %version,
            paramsets = expected,
            n_jobs = jobs,
            "starting experiment"
        );
        let started = Instant::now();

        plugins.experiment_initialize(&info).await;

        let (bus, stream) = Bus::new();
        bus.publish_both(
            Event::experiment(EventKind::ExperimentStart, Arc::clone(&name))
                .at_offset(info.utc_offset_secs),
        );

        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut set = JoinSet::new();
        for paramset in paramsets {
            set.spawn(worker::run_paramset(WorkerParams {
                info: Arc::clone(&info),
                paramset,
                body: Arc::clone(&body),
                plugins: plugins.clone_set(),
                bus: bus.clone(),
                semaphore: Arc::clone(&semaphore),
            }));
        }
        drop(bus);

        let mut consumer = Consumer::new(stream, &listeners, Arc::clone(&name))
            .with_utc_offset(info.utc_offset_secs);
        let outcome = tokio::select! {
            res = consumer.consume_until(expected) => Some(res),
            _ = run_token.cancelled() => None,
        };

        let result = match outcome {
            Some(Ok(out)) => {
                while let Some(joined) = set.join_next().await {
                    if let Err(err) = joined {
                        tracing::error!(target: "expvisor::runner", error = %err, "worker task failed");
                    }
                }
                tracing::info!(
                    target: "expvisor::runner",
                    experiment = %name,
                    had_errors = out.had_errors,
                    took = ?started.elapsed(),
                    "finished experiment"
                );
                Ok(())
            }
            Some(Err(err)) => {
                tracing::error!(target: "expvisor::runner", experiment = %name, error = %err, "run failed");
                tracker.mark_failed(info.now()).await;
                set.abort_all();
                Err(err)
            }
            None => {
                tracing::warn!(
                    target: "expvisor::runner",
                    experiment = %name,
                    took = ?started.elapsed(),
                    "run cancelled, killing workers"
                );
                if let Some(m) = &monitor {
                    m.mark_killed().await;
                }
                tracker.mark_killed(info.now()).await;
                consumer.deliver(EventKind::ExperimentEnd).await;
                set.abort_all();
                Ok(())
            }
        };

        plugins.experiment_finish(&info).await;
        if let Some(m) = &monitor {
            m.stop().await;
        }
        drop(active);
        if let Some(handle) = signals {
            handle.abort();
        }
        drop(set);

        result?;
        let state = tracker.snapshot().await;
        Ok(RunReport {
            experiment: name.to_string(),
            version: version.to_string(),
            status: state.status,
            results: state.results.clone(),
            state,
        })
    }

    async fn start_telemetry(
        &self,
        info: &ExperimentInfo,
        tracker: &RunTracker,
    ) -> Option<Arc<TelemetryMonitor>> {
        let interval = self
            .cfg
            .telemetry
            .as_ref()
            .map_or(DEFAULT_FLUSH_INTERVAL, |t| t.flush_interval);

        let sink = match (&self.sink, &self.cfg.telemetry) {
            (Some(sink), _) => Arc::clone(sink),
            (None, Some(cfg)) => connect_sink(cfg, info).await?,
            (None, None) => return None,
        };
        Some(TelemetryMonitor::start(
            sink,
            tracker.clone(),
            interval,
            info.utc_offset_secs,
        ))
    }
}

#[cfg(feature = "telemetry")]
async fn connect_sink(
    cfg: &crate::core::TelemetryConfig,
    info: &ExperimentInfo,
) -> Option<Arc<dyn TelemetrySink>> {
    match crate::telemetry::HttpTelemetry::connect(cfg, info).await {
        Ok(sink) => Some(Arc::new(sink)),
        Err(err) => {
            tracing::error!(target: "expvisor::telemetry", error = %err, "telemetry disabled");
            None
        }
    }
}

#[cfg(not(feature = "telemetry"))]
async fn connect_sink(
    cfg: &crate::core::TelemetryConfig,
    _info: &ExperimentInfo,
) -> Option<Arc<dyn TelemetrySink>> {
    tracing::warn!(
        target: "expvisor::telemetry",
        url = %cfg.url,
        "telemetry configured but the `telemetry` feature is disabled"
    );
    None
}
