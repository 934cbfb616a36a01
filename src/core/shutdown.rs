//! # Cross-platform OS signal handling.
//!
//! [`SignalWatcher::install`] registers the handlers up front (so a failure is
//! reported before any worker starts); [`SignalWatcher::spawn`] then cancels a
//! [`CancellationToken`] when the first signal arrives.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Registered termination signal handlers.
pub(crate) struct SignalWatcher {
    #[cfg(unix)]
    signals: [tokio::signal::unix::Signal; 3],
}

impl SignalWatcher {
    /// Registers the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub(crate) fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            signals: [
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::quit())?,
            ],
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the first signal.
    #[cfg(unix)]
    async fn wait(mut self) {
        let [sigint, sigterm, sigquit] = &mut self.signals;
        tokio::select! {
            _ = sigint.recv()  => {},
            _ = sigterm.recv() => {},
            _ = sigquit.recv() => {},
        }
    }

    #[cfg(not(unix))]
    async fn wait(self) {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(target: "expvisor::runner", error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    }

    /// Cancels `token` on the first signal; exits quietly when `token` is cancelled elsewhere.
    pub(crate) fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.wait() => {
                    tracing::warn!(target: "expvisor::runner", "termination signal received");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    }
}
