//! Lease guard
//!
//! Gives a timer-driven job cluster-wide exclusivity. The guard caches the
//! lease handle after the first successful acquisition and keeps it alive
//! with a background renewal task; later ticks run without touching the
//! lock service. When a renewal fails the cache is cleared, so the next
//! tick must win the lease again before running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::client::{LockClient, LockHandle};
use super::error::{LeaseError, LeaseResult};
use crate::observability::Observability;
use crate::scheduler::ExecError;
use crate::utils::RetryPolicy;

/// Lease guard configuration
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Lease duration; also bounds each guarded run
    pub ttl: Duration,
    /// Renewal interval as a fraction of `ttl`
    pub renewal_fraction: f64,
    /// Acquisition attempts per tick
    pub acquire_attempts: u32,
    /// Pause between acquisition attempts
    pub acquire_retry_interval: Duration,
    /// Bound on a single acquisition attempt
    pub acquire_attempt_timeout: Duration,
    /// Bound on the whole acquisition, retries included
    pub acquire_timeout: Duration,
    /// Bound on the release at shutdown
    pub release_timeout: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            renewal_fraction: 0.5,
            acquire_attempts: 3,
            acquire_retry_interval: Duration::from_millis(100),
            acquire_attempt_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(4),
            release_timeout: Duration::from_secs(1),
        }
    }
}

impl LeaseConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lease TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the renewal fraction
    pub fn with_renewal_fraction(mut self, fraction: f64) -> Self {
        self.renewal_fraction = fraction;
        self
    }

    /// Set acquisition attempts
    pub fn with_acquire_attempts(mut self, attempts: u32) -> Self {
        self.acquire_attempts = attempts;
        self
    }

    /// Set the pause between acquisition attempts
    pub fn with_acquire_retry_interval(mut self, interval: Duration) -> Self {
        self.acquire_retry_interval = interval;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_acquire_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_attempt_timeout = timeout;
        self
    }

    /// Set the overall acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the release timeout
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Interval between lease renewals
    pub fn renewal_interval(&self) -> Duration {
        self.ttl.mul_f64(self.renewal_fraction)
    }

    /// Fixed-interval policy used for acquisition
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.acquire_attempts, self.acquire_retry_interval)
    }

    /// Reject settings the guard cannot run with
    pub fn validate(&self) -> LeaseResult<()> {
        if self.ttl.is_zero() {
            return Err(LeaseError::InvalidConfig("ttl must be positive".to_string()));
        }
        if !(self.renewal_fraction > 0.0 && self.renewal_fraction < 1.0) {
            return Err(LeaseError::InvalidConfig(format!(
                "renewal_fraction must be in (0, 1), got {}",
                self.renewal_fraction
            )));
        }
        if self.acquire_attempts == 0 {
            return Err(LeaseError::InvalidConfig(
                "acquire_attempts must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout.is_zero() || self.acquire_attempt_timeout.is_zero() {
            return Err(LeaseError::InvalidConfig(
                "acquire timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a guarded tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The lease was held and the work ran
    Executed,
    /// The lease could not be obtained; the work did not run
    Skipped,
}

struct HeldLease {
    handle: Arc<dyn LockHandle>,
    stop: CancellationToken,
    renewal: JoinHandle<()>,
}

/// Runs work only while this process holds a named lease
pub struct LeaseGuard {
    client: Arc<dyn LockClient>,
    key: String,
    config: LeaseConfig,
    held: Arc<Mutex<Option<HeldLease>>>,
    obs: Observability,
}

impl LeaseGuard {
    /// Create a guard for `key`
    pub fn new(
        client: Arc<dyn LockClient>,
        key: impl Into<String>,
        config: LeaseConfig,
    ) -> LeaseResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            key: key.into(),
            config,
            held: Arc::new(Mutex::new(None)),
            obs: Observability::new("lease"),
        })
    }

    /// Record logs and metrics through `obs`
    pub fn with_observability(mut self, obs: Observability) -> Self {
        self.obs = obs;
        self
    }

    /// Lease key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Active configuration
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Whether this process currently believes it holds the lease
    pub async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }

    /// Run `work` if the lease is held or can be acquired.
    ///
    /// A lease held elsewhere is not an error: the tick is skipped. The work
    /// is bounded by the lease TTL; its failure is returned as `Work`.
    pub async fn run<F, Fut>(&self, work: F) -> LeaseResult<TickOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), ExecError>>,
    {
        let span = tracing::info_span!("lease", key = %self.key);
        async {
            if !self.ensure_held().await {
                return Ok(TickOutcome::Skipped);
            }

            match timeout(self.config.ttl, work()).await {
                Ok(Ok(())) => Ok(TickOutcome::Executed),
                Ok(Err(e)) => Err(LeaseError::Work(e.to_string())),
                Err(_) => Err(LeaseError::Timeout("guarded work")),
            }
        }
        .instrument(span)
        .await
    }

    /// Stop renewing and give the lease up, if held
    pub async fn close(&self) -> LeaseResult<()> {
        let held = self.held.lock().await.take();
        let Some(held) = held else {
            return Ok(());
        };

        held.stop.cancel();
        if let Err(e) = held.renewal.await {
            warn!(key = %self.key, error = %e, "Lease renewal task ended abnormally");
        }

        match timeout(self.config.release_timeout, held.handle.release()).await {
            Ok(Ok(())) => {
                info!(key = %self.key, "Lease released");
                Ok(())
            }
            Ok(Err(LeaseError::NotHeld(_))) => {
                debug!(key = %self.key, "Lease already expired at release");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LeaseError::Timeout("lease release")),
        }
    }

    /// Make sure the lease is held, acquiring it if needed.
    ///
    /// Overlapping ticks serialise on the cache mutex, so at most one of
    /// them talks to the lock service.
    async fn ensure_held(&self) -> bool {
        let mut held = self.held.lock().await;
        if held.is_some() {
            debug!("Lease cached, skipping acquisition");
            return true;
        }

        let acquired = self
            .client
            .acquire(
                &self.key,
                self.config.ttl,
                &self.config.retry_policy(),
                self.config.acquire_attempt_timeout,
                self.config.acquire_timeout,
            )
            .await;

        match acquired {
            Ok(handle) => {
                self.obs.incr(
                    "lease_acquire_total",
                    &[("key", self.key.as_str()), ("outcome", "acquired")],
                );
                info!(ttl_secs = self.config.ttl.as_secs(), "Lease acquired");
                *held = Some(self.start_renewal(handle));
                true
            }
            Err(e) => {
                let outcome = match &e {
                    LeaseError::Busy(_) => "busy",
                    LeaseError::Timeout(_) => "timeout",
                    _ => "error",
                };
                self.obs.incr(
                    "lease_acquire_total",
                    &[("key", self.key.as_str()), ("outcome", outcome)],
                );
                warn!(error = %e, "Could not acquire lease, skipping tick");
                false
            }
        }
    }

    fn start_renewal(&self, handle: Arc<dyn LockHandle>) -> HeldLease {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let renewing = handle.clone();
        let cache = self.held.clone();
        let obs = self.obs.clone();
        let key = self.key.clone();
        let interval = self.config.renewal_interval();
        let ttl = self.config.ttl;

        let renewal = tokio::spawn(
            async move {
                let Err(e) = renewing.auto_refresh(interval, ttl, token).await else {
                    return;
                };

                error!(error = %e, "Lease renewal failed, dropping ownership");
                obs.incr("lease_renewal_failures_total", &[("key", key.as_str())]);

                let mut held = cache.lock().await;
                let same_lease = held
                    .as_ref()
                    .is_some_and(|h| h.handle.token() == renewing.token());
                if same_lease {
                    *held = None;
                }
            }
            .instrument(tracing::info_span!("lease_renewal", key = %self.key)),
        );

        HeldLease {
            handle,
            stop,
            renewal,
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.try_lock() {
            if let Some(held) = held.take() {
                held.stop.cancel();
            }
        }
    }
}
