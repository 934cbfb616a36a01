//! Remote telemetry: log forwarding and run progress for an external viewer.
//!
//! - [`TelemetrySink`] backend contract, [`HttpTelemetry`] (feature `telemetry`)
//!   and [`MemoryTelemetry`]
//! - [`TelemetryMonitor`] listener translating run events into [`RunPatch`]es
//! - [`RemoteLogLayer`] `tracing` layer feeding log records to the monitor

#[cfg(feature = "telemetry")]
mod http;
mod layer;
mod monitor;
mod sink;

#[cfg(feature = "telemetry")]
pub use http::HttpTelemetry;
pub use layer::RemoteLogLayer;
pub(crate) use layer::MessageVisitor;
pub use monitor::TelemetryMonitor;
pub use sink::{ConfigExecution, LogRecord, MemoryTelemetry, RunPatch, TelemetrySink};
