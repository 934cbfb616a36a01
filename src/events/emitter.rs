//! # Per-worker event emitter.
//!
//! [`Emitter`] binds a [`Bus`] handle to one experiment and paramset, so the
//! worker wrapper and the step wrapper only name what happened. Every emission
//! publishes the generic event and its owner-specific copy.

use std::sync::Arc;

use crate::error::ErrorInfo;

use super::bus::Bus;
use super::event::{Event, EventKind};

/// Event emitter bound to one paramset.
#[derive(Clone, Debug)]
pub struct Emitter {
    bus: Bus,
    experiment: Arc<str>,
    paramset: Arc<str>,
    utc_offset_secs: i32,
}

impl Emitter {
    pub(crate) fn new(bus: Bus, experiment: Arc<str>, paramset: Arc<str>) -> Self {
        Self {
            bus,
            experiment,
            paramset,
            utc_offset_secs: 0,
        }
    }

    /// Stamps every emitted event at `secs` east of UTC.
    pub(crate) fn with_utc_offset(mut self, secs: i32) -> Self {
        self.utc_offset_secs = secs;
        self
    }

    fn publish(&self, ev: Event) {
        self.bus.publish_both(ev.at_offset(self.utc_offset_secs));
    }

    /// Paramset this emitter reports for.
    pub fn paramset(&self) -> &str {
        &self.paramset
    }

    /// Emits a paramset event (generic + `{paramset}__{suffix}`).
    pub fn paramset_event(&self, kind: EventKind) {
        self.publish(Event::paramset(
            kind,
            Arc::clone(&self.experiment),
            Arc::clone(&self.paramset),
        ));
    }

    /// Emits `ParamsetSuccess` carrying the body result.
    pub fn paramset_success(&self, result: serde_json::Value) {
        self.publish(
            Event::paramset(
                EventKind::ParamsetSuccess,
                Arc::clone(&self.experiment),
                Arc::clone(&self.paramset),
            )
            .with_result(result),
        );
    }

    /// Emits `ParamsetError` carrying the failure.
    pub fn paramset_error(&self, error: ErrorInfo) {
        self.publish(
            Event::paramset(
                EventKind::ParamsetError,
                Arc::clone(&self.experiment),
                Arc::clone(&self.paramset),
            )
            .with_error(error),
        );
    }

    /// Emits a step event (generic + `{step}__{suffix}`).
    pub fn step_event(&self, kind: EventKind, step: &Arc<str>, error: Option<ErrorInfo>) {
        let mut ev = Event::step(
            kind,
            Arc::clone(&self.experiment),
            Arc::clone(&self.paramset),
            Arc::clone(step),
        );
        if let Some(error) = error {
            ev = ev.with_error(error);
        }
        self.publish(ev);
    }
}
