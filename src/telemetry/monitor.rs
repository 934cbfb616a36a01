//! # Telemetry monitor.
//!
//! [`TelemetryMonitor`] bridges a run to a [`TelemetrySink`]:
//! - as a [`Listener`] it turns paramset and step events into [`RunPatch`]es,
//!   computed from the [`RunTracker`] snapshot (the tracker is registered first,
//!   so the snapshot already includes the current event);
//! - it owns the flusher task that drains forwarded log records into the sink
//!   and flushes them on a fixed interval.
//!
//! ```text
//! RemoteLogLayer ──► mpsc ──► flusher task ──push──► sink
//!                                  │ every flush_interval / on stop
//!                                  └────flush───────► sink
//! Consumer ──► on_event ──► RunPatch ──patch_run──► sink
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventKind, now_in};
use crate::listeners::Listener;
use crate::state::{RunState, RunTracker};

use super::layer;
use super::sink::{ConfigExecution, LogRecord, RunPatch, TelemetrySink};

const FINISHED_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

struct Flusher {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Listener + background flusher for one run.
pub struct TelemetryMonitor {
    sink: Arc<dyn TelemetrySink>,
    tracker: RunTracker,
    configs: Mutex<BTreeMap<String, ConfigExecution>>,
    flusher: Mutex<Option<Flusher>>,
    utc_offset_secs: i32,
}

impl TelemetryMonitor {
    /// Creates the monitor, installs the log channel and spawns the flusher.
    pub fn start(
        sink: Arc<dyn TelemetrySink>,
        tracker: RunTracker,
        flush_interval: Duration,
        utc_offset_secs: i32,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        layer::install_sender(tx);

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_flusher(
            Arc::clone(&sink),
            rx,
            flush_interval.max(Duration::from_millis(10)),
            token.clone(),
        ));

        Arc::new(Self {
            sink,
            tracker,
            configs: Mutex::new(BTreeMap::new()),
            flusher: Mutex::new(Some(Flusher { token, handle })),
            utc_offset_secs,
        })
    }

    /// Reports the run as killed.
    pub async fn mark_killed(&self) {
        let state = self.tracker.snapshot().await;
        let configs = self.configs.lock().await.clone();
        let patch = RunPatch {
            killed: Some(true),
            finished_configs: Some(state.completed()),
            configs_execution: Some(configs),
            finished: Some(self.finished_stamp()),
            ..RunPatch::default()
        };
        self.send(patch).await;
    }

    /// Detaches the log channel, stops the flusher and waits for its final flush.
    pub async fn stop(&self) {
        layer::clear_sender();
        let flusher = self.flusher.lock().await.take();
        if let Some(Flusher { token, handle }) = flusher {
            token.cancel();
            if let Err(err) = handle.await {
                tracing::error!(target: "expvisor::telemetry", error = %err, "flusher task failed");
            }
        }
    }

    fn finished_stamp(&self) -> String {
        now_in(self.utc_offset_secs).format(FINISHED_FORMAT).to_string()
    }

    async fn send(&self, patch: RunPatch) {
        if let Err(err) = self.sink.patch_run(patch).await {
            tracing::error!(target: "expvisor::telemetry", error = %err, "failed to update remote run");
        }
    }

    /// Updates the execution entry of `paramset` and builds the patch to send.
    async fn update(
        &self,
        state: &RunState,
        paramset: &str,
        apply: impl FnOnce(&mut ConfigExecution),
    ) -> RunPatch {
        let mut configs = self.configs.lock().await;
        let entry = configs
            .entry(paramset.to_string())
            .or_insert_with(|| ConfigExecution {
                config_name: paramset.to_string(),
                steps: state.steps.clone(),
                ..ConfigExecution::default()
            });
        apply(entry);

        let completed = state.completed();
        RunPatch {
            finished_configs: Some(completed),
            configs_execution: Some(configs.clone()),
            finished: (completed == state.paramsets.len())
                .then(|| self.finished_stamp()),
            ..RunPatch::default()
        }
    }
}

#[async_trait]
impl Listener for TelemetryMonitor {
    async fn on_event(&self, ev: &Event) {
        let Some(paramset) = ev.paramset.as_deref() else {
            return;
        };
        let state = self.tracker.snapshot().await;
        let millis = ev.at.timestamp_millis();

        let patch = match ev.kind {
            EventKind::ParamsetStart => {
                self.update(&state, paramset, |c| {
                    c.has_errors = false;
                    c.started = Some(millis);
                })
                .await
            }
            EventKind::ParamsetSuccess => {
                self.update(&state, paramset, |c| {
                    c.has_errors = false;
                    c.finished = Some(millis);
                })
                .await
            }
            EventKind::ParamsetError => {
                let error = ev.error.clone();
                let mut patch = self
                    .update(&state, paramset, |c| {
                        c.has_errors = true;
                        c.finished = Some(millis);
                        c.error_message = error.as_ref().map(|e| e.message.clone());
                        c.stack_trace = error.map(|e| e.stack_trace);
                    })
                    .await;
                patch.has_errors = Some(true);
                patch
            }
            EventKind::StepEnd => {
                let Some(ps) = state.paramsets.get(paramset) else {
                    return;
                };
                let completed: BTreeMap<String, String> = ps
                    .steps
                    .iter()
                    .filter_map(|(name, st)| {
                        st.finished_at
                            .map(|at| (name.clone(), at.format(FINISHED_FORMAT).to_string()))
                    })
                    .collect();
                let current = ps.current_step.clone();
                let mut patch = self
                    .update(&state, paramset, |c| {
                        c.current_step = current;
                        c.steps_completed = Some(completed);
                    })
                    .await;
                patch.finished_configs = None;
                patch.finished = None;
                patch
            }
            _ => return,
        };
        self.send(patch).await;
    }

    fn name(&self) -> &str {
        "telemetry_monitor"
    }
}

async fn run_flusher(
    sink: Arc<dyn TelemetrySink>,
    mut rx: mpsc::UnboundedReceiver<LogRecord>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            rec = rx.recv() => match rec {
                Some(rec) => sink.push(rec),
                None => break,
            },
            _ = ticker.tick() => flush(sink.as_ref()).await,
        }
    }

    while let Ok(rec) = rx.try_recv() {
        sink.push(rec);
    }
    flush(sink.as_ref()).await;
}

async fn flush(sink: &dyn TelemetrySink) {
    if let Err(err) = sink.flush().await {
        tracing::error!(target: "expvisor::telemetry", error = %err, "failed to flush logs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorInfo;
    use crate::telemetry::MemoryTelemetry;

    async fn setup() -> (Arc<MemoryTelemetry>, RunTracker, Arc<TelemetryMonitor>) {
        let sink = Arc::new(MemoryTelemetry::new());
        let tracker = RunTracker::new(RunState::new(
            "exp",
            "v",
            &["a".to_string(), "b".to_string()],
            &["fit".to_string()],
        ));
        let monitor = TelemetryMonitor::start(sink.clone(), tracker.clone(), Duration::from_secs(60), 0);
        (sink, tracker, monitor)
    }

    async fn feed(tracker: &RunTracker, monitor: &TelemetryMonitor, ev: Event) {
        tracker.on_event(&ev).await;
        monitor.on_event(&ev).await;
    }

    #[tokio::test]
    async fn test_paramset_events_become_patches() {
        let (sink, tracker, monitor) = setup().await;

        feed(&tracker, &monitor, Event::paramset(EventKind::ParamsetStart, "exp", "a")).await;
        feed(&tracker, &monitor, Event::paramset(EventKind::ParamsetSuccess, "exp", "a")).await;
        feed(&tracker, &monitor, Event::paramset(EventKind::ParamsetStart, "exp", "b")).await;
        feed(
            &tracker,
            &monitor,
            Event::paramset(EventKind::ParamsetError, "exp", "b")
                .with_error(ErrorInfo::new("boom", "trace")),
        )
        .await;
        monitor.stop().await;

        let patches = sink.patches();
        assert_eq!(patches.len(), 4);
        assert_eq!(patches[1].finished_configs, Some(1));
        assert!(patches[1].finished.is_none());

        let last = &patches[3];
        assert_eq!(last.has_errors, Some(true));
        assert_eq!(last.finished_configs, Some(2));
        assert!(last.finished.is_some());
        let b = &last.configs_execution.as_ref().unwrap()["b"];
        assert!(b.has_errors);
        assert_eq!(b.error_message.as_deref(), Some("boom"));
        assert_eq!(b.steps, vec!["fit"]);
    }

    #[tokio::test]
    async fn test_step_end_reports_completed_steps() {
        let (sink, tracker, monitor) = setup().await;

        feed(&tracker, &monitor, Event::step(EventKind::StepStart, "exp", "a", "fit")).await;
        feed(&tracker, &monitor, Event::step(EventKind::StepSuccess, "exp", "a", "fit")).await;
        feed(&tracker, &monitor, Event::step(EventKind::StepEnd, "exp", "a", "fit")).await;
        monitor.mark_killed().await;
        monitor.stop().await;

        let patches = sink.patches();
        assert_eq!(patches.len(), 2);
        let a = &patches[0].configs_execution.as_ref().unwrap()["a"];
        assert_eq!(a.current_step.as_deref(), Some("fit"));
        assert!(a.steps_completed.as_ref().unwrap().contains_key("fit"));
        assert_eq!(patches[1].killed, Some(true));
    }

    #[tokio::test]
    async fn test_stop_flushes_buffered_records() {
        let (sink, _tracker, monitor) = setup().await;
        sink.push(LogRecord {
            timestamp_string: String::new(),
            timestamp: String::new(),
            experiment_name: None,
            experiment_version: None,
            logger: "t".into(),
            config_name: None,
            filename: None,
            function_name: None,
            line_number: None,
            level: "INFO".into(),
            level_value: 20,
            message: "hello".into(),
            stack_info: None,
        });
        monitor.stop().await;
        assert_eq!(sink.flushed().len(), 1);
        monitor.stop().await;
    }
}
