//! # PluginSet: isolated hook fan-out.
//!
//! Calls one hook on every plugin in registration order. Each call runs inside
//! a `plugin{name}` span; an `Err` or a panic is logged at `error` and the next
//! plugin still runs.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::Instrument;

use crate::core::{ExperimentInfo, ParamsetContext};
use crate::error::{ErrorInfo, PluginError, RunError};
use crate::experiment::Params;
use crate::listeners::panic_message;

use super::Plugin;

/// Ordered plugins with unique names.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginSet {
    /// Builds the set, rejecting duplicate names.
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Result<Self, RunError> {
        let mut seen = HashSet::new();
        for p in &plugins {
            if !seen.insert(p.name().to_string()) {
                return Err(RunError::DuplicatePlugin {
                    name: p.name().to_string(),
                });
            }
        }
        Ok(Self { plugins })
    }

    /// Independent copies of every plugin, for one worker.
    pub fn clone_set(&self) -> Self {
        Self {
            plugins: self.plugins.iter().map(|p| p.clone_box()).collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn experiment_initialize(&mut self, info: &ExperimentInfo) {
        for p in &mut self.plugins {
            let name = p.name().to_string();
            let span = tracing::info_span!("plugin", name = %name);
            let res = AssertUnwindSafe(p.experiment_initialize(info))
                .catch_unwind()
                .instrument(span.clone())
                .await;
            span.in_scope(|| report(&name, "experiment_initialize", res));
        }
    }

    pub async fn experiment_finish(&mut self, info: &ExperimentInfo) {
        for p in &mut self.plugins {
            let name = p.name().to_string();
            let span = tracing::info_span!("plugin", name = %name);
            let res = AssertUnwindSafe(p.experiment_finish(info))
                .catch_unwind()
                .instrument(span.clone())
                .await;
            span.in_scope(|| report(&name, "experiment_finish", res));
        }
    }

    pub async fn paramset_start(&mut self, ctx: &ParamsetContext, params: &Params) {
        for p in &mut self.plugins {
            let name = p.name().to_string();
            let span = tracing::info_span!("plugin", name = %name);
            let res = AssertUnwindSafe(p.paramset_start(ctx, params))
                .catch_unwind()
                .instrument(span.clone())
                .await;
            span.in_scope(|| report(&name, "paramset_start", res));
        }
    }

    pub async fn paramset_finish(&mut self, ctx: &ParamsetContext, error: Option<&ErrorInfo>) {
        for p in &mut self.plugins {
            let name = p.name().to_string();
            let span = tracing::info_span!("plugin", name = %name);
            let res = AssertUnwindSafe(p.paramset_finish(ctx, error))
                .catch_unwind()
                .instrument(span.clone())
                .await;
            span.in_scope(|| report(&name, "paramset_finish", res));
        }
    }
}

fn report(
    name: &str,
    hook: &'static str,
    res: Result<Result<(), PluginError>, Box<dyn std::any::Any + Send>>,
) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(target: "expvisor::plugin", plugin = name, hook, error = %err, "plugin hook failed");
        }
        Err(panic) => {
            tracing::error!(
                target: "expvisor::plugin",
                plugin = name,
                hook,
                panic = %panic_message(panic.as_ref()),
                "plugin hook panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone)]
    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn experiment_initialize(&mut self, _info: &ExperimentInfo) -> Result<(), PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                panic!("init exploded");
            }
            Ok(())
        }

        async fn experiment_finish(&mut self, _info: &ExperimentInfo) -> Result<(), PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PluginError::new(self.name, "experiment_finish", "nope"));
            }
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn Plugin> {
            Box::new(self.clone())
        }
    }

    fn info() -> ExperimentInfo {
        ExperimentInfo {
            name: "exp".into(),
            version: "v".into(),
            paramsets: vec!["a".to_string()].into(),
            steps: Vec::new().into(),
            n_jobs: 1,
            utc_offset_secs: 0,
            cache_dir: ".".into(),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = Counting {
            name: "dup",
            calls,
            fail: false,
        };
        let err = PluginSet::new(vec![Box::new(p.clone()), Box::new(p)])
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "run_duplicate_plugin");
    }

    #[tokio::test]
    async fn test_failing_plugin_does_not_stop_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set = PluginSet::new(vec![
            Box::new(Counting {
                name: "bad",
                calls: Arc::clone(&calls),
                fail: true,
            }),
            Box::new(Counting {
                name: "good",
                calls: Arc::clone(&calls),
                fail: false,
            }),
        ])
        .unwrap();

        let info = info();
        set.experiment_initialize(&info).await;
        set.experiment_finish(&info).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(set.clone_set().names(), vec!["bad", "good"]);
    }
}
