//! # Run tracker listener.
//!
//! [`RunTracker`] is the single writer of the [`RunState`]: it is registered
//! first on the listener registry, so every other listener that reads a
//! snapshot already sees the effect of the current event.
//!
//! ```text
//! Consumer ──► ListenerRegistry ──► RunTracker::on_event ──► RunState::apply
//!                                                                │
//!           runner / telemetry monitor ◄── snapshot() ◄──────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio::sync::RwLock;

use crate::events::Event;
use crate::listeners::Listener;

use super::run::{RunState, RunStatus};

/// Shared handle to the run state. Cloning shares the same state.
#[derive(Clone)]
pub struct RunTracker {
    state: Arc<RwLock<RunState>>,
}

impl RunTracker {
    pub fn new(state: RunState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> RunState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> RunStatus {
        self.state.read().await.status
    }

    /// Marks the run as killed. Used by the coordinator after the consume loop was abandoned.
    pub async fn mark_killed(&self, at: DateTime<FixedOffset>) {
        self.state.write().await.mark_killed(at);
    }

    /// Marks the run as failed (coordinator failure).
    pub async fn mark_failed(&self, at: DateTime<FixedOffset>) {
        let mut state = self.state.write().await;
        state.status = RunStatus::Failed;
        state.finished_at = Some(at);
    }
}

#[async_trait]
impl Listener for RunTracker {
    async fn on_event(&self, event: &Event) {
        let mut state = self.state.write().await;
        if let Err(err) = state.apply(event) {
            // Keys are fixed at construction; reaching this is a runtime bug.
            panic!("run state invariant broken by {}: {err}", event.topic());
        }
    }

    fn name(&self) -> &str {
        "run_tracker"
    }
}
