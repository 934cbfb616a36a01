//! # Example: listeners
//!
//! Demonstrates how to build and attach custom event listeners.
//!
//! Shows how to:
//! - Implement the [`Listener`] trait for a stateful listener.
//! - Subscribe with the three topic forms: [`Topic::Any`], [`Topic::Kind`]
//!   and [`Topic::Named`] (via [`Topic::specific`]).
//! - Use [`ListenerFn`] for one-off closures.
//!
//! ## Flow
//! ```text
//! worker ──► Bus ──► Consumer
//!                      ├─► RunTracker.on_event()
//!                      ├─► LogWriter.on_event()
//!                      ├─► Progress.on_event()        (Topic::Kind(ParamsetEnd))
//!                      ├─► closure "failures"         (Topic::Kind(ParamsetError))
//!                      └─► closure "watch slow"       (Topic::Named("slow__PARAMSET_END"))
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example listeners
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use expvisor::{
    Event, EventKind, Experiment, ExperimentError, Listener, ListenerFn, Params,
    ParamsetContext, RunnerConfig, Topic,
};
use serde_json::json;

/// Prints "k/N" every time a paramset ends.
struct Progress {
    done: AtomicUsize,
    total: usize,
}

#[async_trait]
impl Listener for Progress {
    async fn on_event(&self, ev: &Event) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[progress] {done}/{} ({} ended)",
            self.total,
            ev.paramset.as_deref().unwrap_or("<unknown>")
        );
    }

    fn name(&self) -> &str {
        "progress"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let names = ["fast", "medium", "slow", "broken"];

    let progress = Arc::new(Progress {
        done: AtomicUsize::new(0),
        total: names.len(),
    });

    let failures = ListenerFn::arc("failures", |ev: &Event| {
        let message = ev.error.as_ref().map(|e| e.message.as_str()).unwrap_or("<none>");
        println!(
            "[failures] {} failed: {message}",
            ev.paramset.as_deref().unwrap_or("<unknown>")
        );
    });

    let watch_slow = ListenerFn::arc("watch slow", |ev: &Event| {
        println!("[watch] got {}", ev.topic());
    });

    let experiment = Experiment::builder("listeners_demo")
        .paramsets(names.iter().enumerate().map(|(i, n)| (*n, json!({ "delay_ms": 50 * i }))))
        .on_event(EventKind::ParamsetEnd, progress)
        .on_event(EventKind::ParamsetError, failures)
        .on_event(Topic::specific("slow", EventKind::ParamsetEnd), watch_slow)
        .function(|ctx: ParamsetContext, params: Params| async move {
            let delay: u64 = params.get("delay_ms")?;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if ctx.paramset() == "broken" {
                return Err(ExperimentError::fail("simulated failure"));
            }
            Ok::<_, ExperimentError>(json!(delay))
        })
        .build()?;

    let cfg = RunnerConfig {
        n_jobs: 2,
        ..RunnerConfig::default()
    };
    let report = experiment.run(cfg).await?;
    println!("status: {:?}, failed: {:?}", report.status, report.failed());
    Ok(())
}
