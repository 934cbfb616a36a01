//! # ListenerRegistry: topic-filtered, in-order fan-out.
//!
//! [`ListenerRegistry`] delivers each [`Event`] to every listener whose
//! [`Topic`] matches, **awaiting** each one before moving to the next.
//!
//! ## What it guarantees
//! - Registration order is delivery order.
//! - Every listener sees events in consumer order.
//! - Panics inside listeners are caught and logged (isolation).
//!
//! ## Diagram
//! ```text
//!    dispatch(&Event)
//!        │
//!        ├─ Topic::Any        matches? ─► tracker.on_event().await
//!        ├─ Topic::Kind(k)    matches? ─► listener.on_event().await
//!        └─ Topic::Named(s)   matches? ─► listener.on_event().await
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::events::{Event, Topic};

use super::listener::ListenerRef;

struct Entry {
    topic: Topic,
    listener: ListenerRef,
}

/// Ordered set of `(topic, listener)` subscriptions.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Vec<Entry>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. No replay of earlier events.
    pub fn subscribe(&mut self, topic: impl Into<Topic>, listener: ListenerRef) {
        self.entries.push(Entry {
            topic: topic.into(),
            listener,
        });
    }

    /// Moves every subscription of `other` after the existing ones.
    pub fn extend(&mut self, other: ListenerRegistry) {
        self.entries.extend(other.entries);
    }

    /// Delivers one event to all matching listeners, in order.
    pub async fn dispatch(&self, event: &Event) {
        for entry in self.entries.iter().filter(|e| e.topic.matches(event)) {
            let fut = entry.listener.on_event(event);
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                tracing::error!(
                    target: "expvisor::events",
                    listener = entry.listener.name(),
                    topic = %event.topic(),
                    panic = %panic_message(panic.as_ref()),
                    "listener panicked"
                );
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
