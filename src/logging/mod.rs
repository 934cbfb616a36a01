//! Logging setup for binaries and demos running experiments.
//!
//! Installs a global `tracing` subscriber with:
//! - an `EnvFilter` (`RUST_LOG` wins over [`LoggingConfig::level`]);
//! - a stdout layer;
//! - an optional non-blocking file layer (`tracing-appender`), truncated on start;
//! - optional per-paramset files ([`ParamsetLogLayer`]) under the same directory;
//! - an optional [`RemoteLogLayer`] that forwards records to remote telemetry while a
//!   monitored run is active.
//!
//! Library code never calls this; it only emits through `tracing`.

use std::fs;
use std::io;
use std::path::PathBuf;

mod paramset;

pub use paramset::ParamsetLogLayer;

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::telemetry::RemoteLogLayer;

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory of the log file; `None` logs to stdout only.
    pub directory: Option<PathBuf>,
    /// Log file name inside `directory`.
    pub file_name: String,
    /// Also write `{directory}/{paramset}/...` files for every paramset.
    pub paramset_logs: bool,
    /// ANSI colors on stdout.
    pub ansi: bool,
    /// Forward records to the remote telemetry backend during runs.
    pub remote: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_name: "expvisor.log".to_string(),
            paramset_logs: true,
            ansi: true,
            remote: true,
        }
    }
}

/// Keeps the file writer alive; dropping it flushes and closes the log file.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// # Errors
/// Fails if the log directory cannot be prepared or a global subscriber is
/// already installed.
pub fn init_logging(cfg: &LoggingConfig) -> io::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(cfg.ansi)
        .with_target(true);

    let (file_layer, file_guard) = match &cfg.directory {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            fs::write(dir.join(&cfg.file_name), "")?;
            let appender = tracing_appender::rolling::never(dir, &cfg.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let paramset_layer = cfg
        .directory
        .as_ref()
        .filter(|_| cfg.paramset_logs)
        .map(ParamsetLogLayer::new);
    let remote_layer = cfg.remote.then(RemoteLogLayer::new);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(paramset_layer)
        .with(remote_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
