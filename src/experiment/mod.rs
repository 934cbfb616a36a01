//! Experiment definition: body, paramsets, steps and the builder.
//!
//! - [`Experiment`] / [`ExperimentBuilder`] the validated definition of a run
//! - [`ExperimentBody`] / [`ExperimentFn`] the code executed once per paramset
//! - [`Params`] / [`Paramset`] named parameter sets
//! - [`Step`] / [`StepRegistry`] observable sub-units of the body

mod builder;
mod function;
mod paramset;
mod spec;
mod step;

pub use builder::{DEFAULT_VERSION, ExperimentBuilder};
pub use function::{BoxBodyFuture, ExperimentBody, ExperimentFn};
pub use paramset::{Params, Paramset};
pub use spec::Experiment;
pub use step::{Step, StepRegistry};
