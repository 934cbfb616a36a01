//! Plugins: lifecycle hooks run on the coordinator and inside every worker.

mod plugin;
mod set;

pub use plugin::Plugin;
pub use set::PluginSet;
