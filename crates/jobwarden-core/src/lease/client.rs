//! Distributed lock client seam

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::error::{LeaseError, LeaseResult};
use crate::utils::{retry_with_policy, RetryPolicy};

/// A held lease
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Lease key
    fn key(&self) -> &str;

    /// Opaque token identifying this holder
    fn token(&self) -> &str;

    /// Extend the lease to `ttl` from now. `NotHeld` if the token no longer matches.
    async fn refresh(&self, ttl: Duration) -> LeaseResult<()>;

    /// Give the lease up. `NotHeld` if it already expired or changed hands.
    async fn release(&self) -> LeaseResult<()>;

    /// Refresh every `interval` until `stop` fires or a refresh fails.
    ///
    /// Each refresh is bounded by `interval`. Returns `Ok(())` only when
    /// stopped.
    async fn auto_refresh(
        &self,
        interval: Duration,
        ttl: Duration,
        stop: CancellationToken,
    ) -> LeaseResult<()> {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!(key = %self.key(), "Lease auto-refresh stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match timeout(interval, self.refresh(ttl)).await {
                        Ok(Ok(())) => trace!(key = %self.key(), "Lease refreshed"),
                        Ok(Err(e)) => {
                            return Err(LeaseError::RenewalFailed(format!("{}: {}", self.key(), e)))
                        }
                        Err(_) => {
                            return Err(LeaseError::RenewalFailed(format!(
                                "{}: refresh timed out",
                                self.key()
                            )))
                        }
                    }
                }
            }
        }
    }
}

/// Client for an external lock service
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Single acquisition attempt. `Busy` if someone else holds `key`.
    async fn try_lock(&self, key: &str, ttl: Duration) -> LeaseResult<Arc<dyn LockHandle>>;

    /// Acquire `key`, retrying per `policy`.
    ///
    /// Each attempt is bounded by `attempt_timeout` and the whole call by
    /// `overall_timeout`. Returns the last attempt's error when retries run
    /// out.
    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        policy: &RetryPolicy,
        attempt_timeout: Duration,
        overall_timeout: Duration,
    ) -> LeaseResult<Arc<dyn LockHandle>> {
        let attempt = || async move {
            match timeout(attempt_timeout, self.try_lock(key, ttl)).await {
                Ok(result) => result,
                Err(_) => Err(LeaseError::Timeout("lock attempt")),
            }
        };

        match timeout(
            overall_timeout,
            retry_with_policy(policy, attempt, LeaseError::is_retryable),
        )
        .await
        {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(e.last_error),
            Err(_) => Err(LeaseError::Timeout("lock acquisition")),
        }
    }
}
