use std::future::Future;
use std::sync::Arc;

use crate::core::ParamsetContext;
use crate::error::{ExperimentError, RunError};
use crate::events::Topic;
use crate::listeners::{ListenerRef, ListenerRegistry};
use crate::plugins::{Plugin, PluginSet};

use super::function::{ExperimentBody, ExperimentFn};
use super::paramset::{self, Paramset, Params};
use super::spec::Experiment;
use super::step::StepRegistry;

/// Version used when none is set.
pub const DEFAULT_VERSION: &str = "default";

/// Builder for [`Experiment`] with fluent API
pub struct ExperimentBuilder {
    name: String,
    version: String,
    paramsets: Vec<Paramset>,
    n_jobs: Option<usize>,
    steps: StepRegistry,
    plugins: Vec<Box<dyn Plugin>>,
    listeners: ListenerRegistry,
    body: Option<Arc<dyn ExperimentBody>>,
}

impl ExperimentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_VERSION.to_string(),
            paramsets: Vec::new(),
            n_jobs: None,
            steps: StepRegistry::new(),
            plugins: Vec::new(),
            listeners: ListenerRegistry::new(),
            body: None,
        }
    }

    /// Version string; scopes the variable store.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn paramset(mut self, name: impl Into<String>, params: impl Into<Params>) -> Self {
        self.paramsets.push(Paramset::new(name, params));
        self
    }

    pub fn paramsets<I, N, P>(mut self, paramsets: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<Params>,
    {
        self.paramsets
            .extend(paramsets.into_iter().map(|(n, p)| Paramset::new(n, p)));
        self
    }

    /// Overrides [`RunnerConfig::n_jobs`](crate::RunnerConfig::n_jobs) for this experiment.
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Registers a listener; delivered after the built-in ones.
    pub fn on_event(mut self, topic: impl Into<Topic>, listener: ListenerRef) -> Self {
        self.listeners.subscribe(topic, listener);
        self
    }

    /// Sets the body from a closure.
    pub fn function<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ParamsetContext, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ExperimentError>> + Send + 'static,
    {
        self.body = Some(Arc::new(ExperimentFn::new(f)));
        self
    }

    /// Sets the body from an existing implementation.
    pub fn body(mut self, body: Arc<dyn ExperimentBody>) -> Self {
        self.body = Some(body);
        self
    }

    /// Validates and builds the experiment.
    ///
    /// Fails on: no paramsets, duplicate paramset names, duplicate plugin names,
    /// missing body.
    pub fn build(self) -> Result<Experiment, RunError> {
        paramset::validate(&self.name, &self.paramsets)?;
        let plugins = PluginSet::new(self.plugins)?;
        let body = self.body.ok_or_else(|| RunError::MissingFunction {
            experiment: self.name.clone(),
        })?;

        Ok(Experiment {
            name: Arc::from(self.name),
            version: Arc::from(self.version),
            paramsets: self.paramsets,
            n_jobs: self.n_jobs,
            steps: self.steps,
            plugins,
            listeners: self.listeners,
            body,
        })
    }
}
