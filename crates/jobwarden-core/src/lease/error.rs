//! Error types for lease operations

/// Result type for lease operations
pub type LeaseResult<T> = std::result::Result<T, LeaseError>;

/// Lease error types
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// Another holder owns the lease
    #[error("lease busy: {0}")]
    Busy(String),
    /// Extending the lease failed; ownership can no longer be assumed
    #[error("lease renewal failed: {0}")]
    RenewalFailed(String),
    /// The token no longer matches the stored lease
    #[error("lease not held: {0}")]
    NotHeld(String),
    /// A bounded lease operation ran out of time
    #[error("{0} timed out")]
    Timeout(&'static str),
    /// Lock backend failure (network, protocol)
    #[error("lock backend error: {0}")]
    Backend(String),
    /// The guarded work reported a failure
    #[error("guarded work failed: {0}")]
    Work(String),
    /// Invalid configuration
    #[error("invalid lease configuration: {0}")]
    InvalidConfig(String),
}

impl LeaseError {
    /// Whether another acquisition attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LeaseError::Busy(_) | LeaseError::Timeout(_) | LeaseError::Backend(_)
        )
    }
}

impl From<redis::RedisError> for LeaseError {
    fn from(err: redis::RedisError) -> Self {
        LeaseError::Backend(err.to_string())
    }
}
