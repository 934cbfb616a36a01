//! # Per-paramset log files.
//!
//! [`ParamsetLogLayer`] routes every record emitted inside a worker's
//! `paramset` span into that paramset's own directory:
//!
//! ```text
//! {root}/{paramset}/paramset.{LEVEL}.log        records outside any step
//! {root}/{paramset}/{step}/{step}.{LEVEL}.log   records inside a `step` span
//! ```
//!
//! One file per threshold (`DEBUG`, `INFO`, `WARN`, `ERROR`); a record lands in
//! every file whose threshold admits it. Records outside a paramset are ignored.
//! Appenders are opened lazily and kept for the process lifetime.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::core::active_experiment;
use crate::telemetry::MessageVisitor;

const THRESHOLDS: [Level; 4] = [Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR];

/// Span fields that select a log destination.
#[derive(Debug, Clone, Default)]
struct Route {
    paramset: Option<String>,
    step: Option<String>,
}

impl Visit for Route {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field, format!("{value:?}"));
    }
}

impl Route {
    fn set(&mut self, field: &Field, value: String) {
        match field.name() {
            "paramset" => self.paramset = Some(value),
            "step" => self.step = Some(value),
            _ => {}
        }
    }
}

type Appenders = Arc<[(Level, RollingFileAppender)]>;

/// Writes records of each paramset (and step) into separate files.
pub struct ParamsetLogLayer {
    root: PathBuf,
    files: Mutex<HashMap<PathBuf, Appenders>>,
}

impl ParamsetLogLayer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens (once) the threshold files for `paramset` and optional `step`.
    fn appenders(&self, paramset: &str, step: Option<&str>) -> Option<Appenders> {
        let (dir, stem) = match step {
            Some(step) => (
                self.root.join(path_safe(paramset)).join(path_safe(step)),
                path_safe(step),
            ),
            None => (self.root.join(path_safe(paramset)), "paramset".to_string()),
        };

        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let key = dir.join(&stem);
        if let Some(found) = files.get(&key) {
            return Some(Arc::clone(found));
        }

        let mut opened = Vec::with_capacity(THRESHOLDS.len());
        for level in THRESHOLDS {
            let appender = RollingFileAppender::builder()
                .filename_prefix(format!("{stem}.{level}"))
                .filename_suffix("log")
                .build(&dir)
                .ok()?;
            opened.push((level, appender));
        }
        let opened: Appenders = opened.into();
        files.insert(key, Arc::clone(&opened));
        Some(opened)
    }
}

impl<S> Layer<S> for ParamsetLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut route = Route::default();
        attrs.record(&mut route);
        if route.paramset.is_none() && route.step.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(route);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let mut found = Route::default();
        for span in scope {
            if let Some(route) = span.extensions().get::<Route>() {
                if found.step.is_none() {
                    found.step.clone_from(&route.step);
                }
                if found.paramset.is_none() {
                    found.paramset.clone_from(&route.paramset);
                }
            }
        }
        let Some(paramset) = found.paramset else {
            return;
        };
        let Some(appenders) = self.appenders(&paramset, found.step.as_deref()) else {
            return;
        };

        let meta = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let at = active_experiment().map_or_else(crate::events::now, |run| run.now());

        let mut line = String::new();
        let _ = writeln!(
            line,
            "[{}] {} {}: {}",
            meta.level(),
            at.format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.target(),
            visitor.finish()
        );
        for (threshold, appender) in appenders.iter() {
            if meta.level() <= threshold {
                let _ = appender.make_writer().write_all(line.as_bytes());
            }
        }
    }
}

/// Maps a name onto a single path component.
fn path_safe(name: &str) -> String {
    match name {
        "" | "." | ".." => "_".to_string(),
        _ => name.replace(['/', '\\', '\0'], "_"),
    }
}
