//! Server configuration types
//!
//! Contains all configuration structures for the jobwarden worker.

use anyhow::{Context, Result};
use jobwarden_core::{LeaseConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub scheduler: SchedulerAppConfig,
    #[serde(default)]
    pub lease: LeaseAppConfig,
    #[serde(default)]
    pub stale_report: StaleReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Check every section the worker converts into library settings
    pub fn validate(&self) -> Result<()> {
        self.scheduler_config()?;
        self.lease_config()?;
        Ok(())
    }

    /// Library scheduler settings, validated
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let s = &self.scheduler;
        let config = SchedulerConfig::new()
            .with_db_timeout(Duration::from_millis(s.db_timeout_ms))
            .with_max_concurrent(s.max_concurrent)
            .with_heartbeat_interval(Duration::from_millis(s.heartbeat_interval_ms))
            .with_execution_timeout(Duration::from_secs(s.execution_timeout_secs))
            .with_release_timeout(Duration::from_millis(s.release_timeout_ms))
            .with_idle_backoff(Duration::from_millis(s.idle_backoff_ms))
            .with_max_consecutive_store_errors(s.max_consecutive_store_errors)
            .with_max_store_error_backoff(Duration::from_millis(s.max_store_error_backoff_ms))
            .with_abandon_delay(Duration::from_secs(s.abandon_delay_secs));
        config
            .validate()
            .context("Invalid [scheduler] configuration")?;
        Ok(config)
    }

    /// Library lease settings, validated
    pub fn lease_config(&self) -> Result<LeaseConfig> {
        let l = &self.lease;
        let config = LeaseConfig::new()
            .with_ttl(Duration::from_secs(l.ttl_secs))
            .with_renewal_fraction(l.renewal_fraction)
            .with_acquire_attempts(l.acquire_attempts)
            .with_acquire_retry_interval(Duration::from_millis(l.acquire_retry_interval_ms))
            .with_acquire_attempt_timeout(Duration::from_millis(l.acquire_attempt_timeout_ms))
            .with_acquire_timeout(Duration::from_millis(l.acquire_timeout_ms))
            .with_release_timeout(Duration::from_millis(l.release_timeout_ms));
        config.validate().context("Invalid [lease] configuration")?;
        Ok(config)
    }
}

/// Job store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_timeout_ms")]
    pub db_timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_release_timeout_ms")]
    pub release_timeout_ms: u64,
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    #[serde(default = "default_max_store_errors")]
    pub max_consecutive_store_errors: u32,
    #[serde(default = "default_max_store_error_backoff_ms")]
    pub max_store_error_backoff_ms: u64,
    #[serde(default = "default_abandon_delay_secs")]
    pub abandon_delay_secs: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for SchedulerAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_timeout_ms: default_db_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            execution_timeout_secs: default_execution_timeout_secs(),
            release_timeout_ms: default_release_timeout_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            max_consecutive_store_errors: default_max_store_errors(),
            max_store_error_backoff_ms: default_max_store_error_backoff_ms(),
            abandon_delay_secs: default_abandon_delay_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_db_timeout_ms() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    60_000
}

fn default_execution_timeout_secs() -> u64 {
    300
}

fn default_release_timeout_ms() -> u64 {
    1000
}

fn default_idle_backoff_ms() -> u64 {
    1000
}

fn default_max_store_errors() -> u32 {
    10
}

fn default_max_store_error_backoff_ms() -> u64 {
    30_000
}

fn default_abandon_delay_secs() -> u64 {
    60
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Lease (distributed lock) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseAppConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_renewal_fraction")]
    pub renewal_fraction: f64,
    #[serde(default = "default_acquire_attempts")]
    pub acquire_attempts: u32,
    #[serde(default = "default_acquire_retry_interval_ms")]
    pub acquire_retry_interval_ms: u64,
    #[serde(default = "default_acquire_attempt_timeout_ms")]
    pub acquire_attempt_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_release_timeout_ms")]
    pub release_timeout_ms: u64,
}

impl Default for LeaseAppConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            renewal_fraction: default_renewal_fraction(),
            acquire_attempts: default_acquire_attempts(),
            acquire_retry_interval_ms: default_acquire_retry_interval_ms(),
            acquire_attempt_timeout_ms: default_acquire_attempt_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            release_timeout_ms: default_release_timeout_ms(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_renewal_fraction() -> f64 {
    0.5
}

fn default_acquire_attempts() -> u32 {
    3
}

fn default_acquire_retry_interval_ms() -> u64 {
    100
}

fn default_acquire_attempt_timeout_ms() -> u64 {
    1000
}

fn default_acquire_timeout_ms() -> u64 {
    4000
}

/// Cluster-wide stale job report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stale_expression")]
    pub expression: String,
    #[serde(default = "default_stale_key")]
    pub key: String,
    #[serde(default = "default_older_than_secs")]
    pub older_than_secs: u64,
}

impl Default for StaleReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expression: default_stale_expression(),
            key: default_stale_key(),
            older_than_secs: default_older_than_secs(),
        }
    }
}

fn default_stale_expression() -> String {
    "0 */5 * * * *".to_string()
}

fn default_stale_key() -> String {
    "job:stale_report".to_string()
}

fn default_older_than_secs() -> u64 {
    180
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::loader::DEFAULT_CONFIG;
    use config::{Config, File, FileFormat};

    fn embedded_defaults() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_embedded_defaults_are_valid() {
        let config = embedded_defaults();
        assert!(config.scheduler.enabled);
        assert_eq!(config.logging.format, LogFormat::Pretty);

        let scheduler = config.scheduler_config().unwrap();
        assert_eq!(scheduler.max_concurrent, 100);
        assert_eq!(scheduler.heartbeat_interval, Duration::from_secs(60));

        let lease = config.lease_config().unwrap();
        assert_eq!(lease.ttl, Duration::from_secs(60));
        assert_eq!(lease.release_timeout, Duration::from_secs(1));
        assert_eq!(scheduler.abandon_delay, Duration::from_secs(60));
        assert_eq!(scheduler.max_store_error_backoff, Duration::from_secs(30));
        assert_eq!(lease.renewal_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let mut config = embedded_defaults();
        config.scheduler.max_concurrent = 0;
        assert!(config.scheduler_config().is_err());

        let mut config = embedded_defaults();
        config.lease.renewal_fraction = 1.5;
        assert!(config.lease_config().is_err());
        assert!(config.validate().is_err());

        let mut config = embedded_defaults();
        config.lease.release_timeout_ms = 250;
        assert_eq!(
            config.lease_config().unwrap().release_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                "[database]\npath = \"jobs.db\"\n[redis]\nurl = \"redis://localhost\"\n[logging]\nformat = \"json\"\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.scheduler.drain_timeout_secs, 30);
        assert_eq!(config.lease.release_timeout_ms, 1000);
        assert_eq!(config.stale_report.key, "job:stale_report");
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
