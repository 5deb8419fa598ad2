//! Graceful shutdown
//!
//! One controller per process. Components take a token from it; a signal
//! (or a fatal error) triggers it, which cancels every token. The owner then
//! drains in-flight work under the controller's timeout.
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let scheduler_task = tokio::spawn(scheduler.start(shutdown.token()));
//!
//! tokio::spawn(shutdown_on_signal(shutdown.clone()));
//! scheduler_task.await??;
//! shutdown.drain(scheduler.drain(shutdown.timeout())).await;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default drain timeout in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Tokens cancelled; no new work is started
    Stopping,
    /// Waiting for in-flight work
    Draining,
    /// Shutdown complete
    Terminated,
}

impl ShutdownPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shutdown controller shared by every component of the process
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: AtomicU8,
    initiated: AtomicBool,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Create a controller with a custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
            initiated: AtomicBool::new(false),
            timeout,
        })
    }

    /// Token for a component; cancelled when shutdown is triggered
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Drain timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Whether shutdown has been triggered
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Cancel every token. Returns `false` if shutdown was already triggered.
    pub fn trigger(&self) -> bool {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return false;
        }

        info!("Initiating graceful shutdown...");
        self.set_phase(ShutdownPhase::Stopping);
        self.cancel_token.cancel();
        true
    }

    /// Await `drained` under the drain timeout, then mark shutdown complete.
    ///
    /// Returns `true` if `drained` finished in time and reported success.
    pub async fn drain<F>(&self, drained: F) -> bool
    where
        F: Future<Output = bool>,
    {
        self.trigger();
        self.set_phase(ShutdownPhase::Draining);

        let clean = match tokio::time::timeout(self.timeout, drained).await {
            Ok(clean) => clean,
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Shutdown timeout exceeded, abandoning in-flight work"
                );
                false
            }
        };

        self.set_phase(ShutdownPhase::Terminated);
        info!(clean, "Graceful shutdown complete");
        clean
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
    Ok(())
}

/// Trigger `controller` on the first shutdown signal
pub async fn shutdown_on_signal(controller: Arc<ShutdownController>) {
    if let Err(e) = wait_for_shutdown_signal().await {
        warn!(error = %e, "Signal handling unavailable, shutting down");
    }
    controller.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_phases() {
        let controller = ShutdownController::new();
        assert_eq!(controller.phase(), ShutdownPhase::Running);
        assert!(!controller.is_shutting_down());

        assert!(controller.trigger());
        assert_eq!(controller.phase(), ShutdownPhase::Stopping);
        assert!(controller.is_shutting_down());

        assert!(controller.drain(async { true }).await);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_cancellation_propagation() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert!(!token.is_cancelled());

        controller.trigger();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_double_trigger() {
        let controller = ShutdownController::new();
        assert!(controller.trigger());
        assert!(!controller.trigger());
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let controller = ShutdownController::with_timeout(Duration::from_millis(50));
        let clean = controller
            .drain(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                true
            })
            .await;

        assert!(!clean);
        assert!(controller.token().is_cancelled());
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }
}
