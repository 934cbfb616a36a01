//! # Coordinator-side event loop.
//!
//! [`Consumer::consume_until`] pulls events from the [`EventStream`] one at a
//! time, hands each to the [`ListenerRegistry`] and counts generic
//! `ParamsetEnd`s. Once every paramset ended it synthesizes the experiment-level
//! terminal events:
//!
//! ```text
//! N × ParamsetEnd ──► [ExperimentSuccess]  (only if no ParamsetError was seen)
//!                 ──► ExperimentEnd
//! ```
//! Both are delivered generic and as `{experiment}__{SUFFIX}`, directly to the
//! listeners (no round-trip through the bus).

use std::sync::Arc;

use crate::error::RunError;
use crate::events::{Event, EventKind, EventStream};
use crate::listeners::ListenerRegistry;

/// Result of a completed consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Generic `ParamsetEnd` events seen.
    pub ended: usize,
    /// Whether any generic `ParamsetError` was seen.
    pub had_errors: bool,
}

pub(crate) struct Consumer<'a> {
    stream: EventStream,
    listeners: &'a ListenerRegistry,
    experiment: Arc<str>,
    utc_offset_secs: i32,
}

impl<'a> Consumer<'a> {
    pub(crate) fn new(
        stream: EventStream,
        listeners: &'a ListenerRegistry,
        experiment: Arc<str>,
    ) -> Self {
        Self {
            stream,
            listeners,
            experiment,
            utc_offset_secs: 0,
        }
    }

    /// Stamps synthesized events at `secs` east of UTC.
    pub(crate) fn with_utc_offset(mut self, secs: i32) -> Self {
        self.utc_offset_secs = secs;
        self
    }

    /// Dispatches events until `expected` paramsets ended.
    ///
    /// Fails with [`RunError::BusClosed`] if every producer went away first.
    pub(crate) async fn consume_until(&mut self, expected: usize) -> Result<Outcome, RunError> {
        let mut ended = 0;
        let mut had_errors = false;

        while ended < expected {
            let Some(ev) = self.stream.recv().await else {
                return Err(RunError::BusClosed {
                    seen: ended,
                    expected,
                });
            };
            if ev.is_generic() {
                match ev.kind {
                    EventKind::ParamsetEnd => ended += 1,
                    EventKind::ParamsetError => had_errors = true,
                    _ => {}
                }
            }
            self.listeners.dispatch(&ev).await;
        }

        // Specific copies published together with the last ends are already queued.
        while let Some(ev) = self.stream.try_recv() {
            self.listeners.dispatch(&ev).await;
        }

        if !had_errors {
            self.deliver(EventKind::ExperimentSuccess).await;
        }
        self.deliver(EventKind::ExperimentEnd).await;

        Ok(Outcome { ended, had_errors })
    }

    /// Delivers an experiment-level event (generic, then specific) to the listeners.
    pub(crate) async fn deliver(&self, kind: EventKind) {
        let ev = Event::experiment(kind, Arc::clone(&self.experiment)).at_offset(self.utc_offset_secs);
        let specific = ev.to_specific();
        self.listeners.dispatch(&ev).await;
        self.listeners.dispatch(&specific).await;
    }
}
