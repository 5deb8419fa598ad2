//! Scheduler configuration

use std::time::Duration;

use super::types::{Result, SchedulerError};
use crate::utils::RetryPolicy;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Bound on each store round-trip (preempt, heartbeat, reschedule)
    pub db_timeout: Duration,
    /// Maximum concurrent executions in this process
    pub max_concurrent: usize,
    /// Interval between `utime` refreshes of a held job
    pub heartbeat_interval: Duration,
    /// Bound on a single execution
    pub execution_timeout: Duration,
    /// Bound on the release that ends every execution
    pub release_timeout: Duration,
    /// Pause after a scan finds nothing due
    pub idle_backoff: Duration,
    /// Store failures in a row before the loop gives up
    pub max_consecutive_store_errors: u32,
    /// Cap on the pause after consecutive store failures
    pub max_store_error_backoff: Duration,
    /// How far an unrunnable job is pushed back when its schedule has no next run
    pub abandon_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_timeout: Duration::from_secs(1),
            max_concurrent: 100,
            heartbeat_interval: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(300),
            release_timeout: Duration::from_secs(1),
            idle_backoff: Duration::from_secs(1),
            max_consecutive_store_errors: 10,
            max_store_error_backoff: Duration::from_secs(30),
            abandon_delay: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store round-trip timeout
    pub fn with_db_timeout(mut self, timeout: Duration) -> Self {
        self.db_timeout = timeout;
        self
    }

    /// Set max concurrent executions
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the execution timeout
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Set the release timeout
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Set the idle backoff
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Set the consecutive store error limit
    pub fn with_max_consecutive_store_errors(mut self, limit: u32) -> Self {
        self.max_consecutive_store_errors = limit;
        self
    }

    /// Set the cap on store failure back-off
    pub fn with_max_store_error_backoff(mut self, max: Duration) -> Self {
        self.max_store_error_backoff = max;
        self
    }

    /// Set the fallback delay for jobs no executor can run
    pub fn with_abandon_delay(mut self, delay: Duration) -> Self {
        self.abandon_delay = delay;
        self
    }

    /// Back-off after consecutive store failures: starts at `idle_backoff`,
    /// doubles, capped at `max_store_error_backoff`
    pub fn store_error_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_consecutive_store_errors,
            self.idle_backoff,
            self.max_store_error_backoff,
        )
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.max_concurrent).is_err() {
            return Err(SchedulerError::InvalidConfig(format!(
                "max_concurrent must not exceed {}",
                u32::MAX
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "heartbeat_interval must be positive".to_string(),
            ));
        }
        if self.db_timeout.is_zero() || self.release_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "store timeouts must be positive".to_string(),
            ));
        }
        if self.execution_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "execution_timeout must be positive".to_string(),
            ));
        }
        if self.abandon_delay.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "abandon_delay must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
