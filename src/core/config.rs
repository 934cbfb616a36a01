//! # Runner configuration.
//!
//! Provides [`RunnerConfig`], the settings for one [`Runner`](crate::Runner), and
//! the optional [`TelemetryConfig`] for the HTTP telemetry sink.
//!
//! Both derive `serde::Deserialize` with field defaults, so callers can load them
//! from any serde format they already use.
//!
//! ## Sentinel values
//! - `n_jobs = 0` → clamped to 1 (sequential execution)
//! - `utc_offset_secs` out of range → UTC
//! - `telemetry = None` → no remote telemetry

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for a run.
///
/// ## Field semantics
/// - `n_jobs`: maximum number of paramsets executing at once (`0` = 1)
/// - `cache_dir`: root directory of the variable store (`{cache_dir}/_cache/...`)
/// - `utc_offset_secs`: time zone offset for event timestamps
/// - `handle_signals`: install SIGINT/SIGTERM/SIGQUIT handlers for the run
/// - `telemetry`: remote telemetry backend, if any
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Worker pool size.
    pub n_jobs: usize,

    /// Root of the durable variable store.
    pub cache_dir: PathBuf,

    /// Seconds east of UTC used for every event timestamp.
    pub utc_offset_secs: i32,

    /// Cancel the run on a termination signal.
    ///
    /// Disable when the caller drives cancellation through a token.
    pub handle_signals: bool,

    /// Remote telemetry backend.
    pub telemetry: Option<TelemetryConfig>,
}

impl RunnerConfig {
    /// Worker pool size clamped to a minimum of 1.
    #[inline]
    pub fn jobs(&self) -> usize {
        self.n_jobs.max(1)
    }
}

impl Default for RunnerConfig {
    /// Default configuration:
    ///
    /// - `n_jobs = 4`
    /// - `cache_dir = "."`
    /// - `utc_offset_secs = 0`
    /// - `handle_signals = true`
    /// - `telemetry = None`
    fn default() -> Self {
        Self {
            n_jobs: 4,
            cache_dir: PathBuf::from("."),
            utc_offset_secs: 0,
            handle_signals: true,
            telemetry: None,
        }
    }
}

/// Remote telemetry backend settings.
#[derive(Clone, Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Base URL, e.g. `http://localhost:8000`.
    pub url: String,
    /// Basic-auth credentials.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// How often buffered log records are sent.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: Duration,
    /// Upper bound for one backend request, connect included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl TelemetryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            credentials: None,
            flush_interval: default_flush_interval(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// Basic-auth pair.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_clamped() {
        let cfg = RunnerConfig {
            n_jobs: 0,
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.jobs(), 1);
        assert_eq!(RunnerConfig::default().jobs(), 4);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cfg: RunnerConfig = serde_json::from_str(
            r#"{"n_jobs": 2, "telemetry": {"url": "http://localhost:8000"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.n_jobs, 2);
        assert!(cfg.handle_signals);
        let telemetry = cfg.telemetry.unwrap();
        assert_eq!(telemetry.flush_interval, Duration::from_secs(5));
        assert_eq!(telemetry.request_timeout, Duration::from_secs(10));
        assert!(telemetry.credentials.is_none());
    }

    #[test]
    fn test_credentials_are_redacted() {
        let cfg = TelemetryConfig::new("http://x/").with_credentials("u", "secret");
        assert_eq!(cfg.url, "http://x");
        assert!(!format!("{cfg:?}").contains("secret"));
    }
}
