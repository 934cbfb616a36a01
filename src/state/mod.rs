//! Run state: the event-driven state machine and its tracker listener.

mod run;
mod tracker;

pub use run::{ParamsetState, RunState, RunStatus, Status, StepState};
pub use tracker::RunTracker;
