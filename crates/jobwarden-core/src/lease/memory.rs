//! In-memory lock backend
//!
//! Process-local [`LockClient`] with the same expiry semantics as Redis.
//! Clones share state, so two clones behave like two processes talking to
//! one lock service. Counts acquisition attempts and can be told to fail
//! refreshes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::client::{LockClient, LockHandle};
use super::error::{LeaseError, LeaseResult};

struct Entry {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    locks: Mutex<HashMap<String, Entry>>,
    try_lock_calls: AtomicUsize,
    fail_refresh: AtomicBool,
}

impl Inner {
    fn locks(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory [`LockClient`]
#[derive(Clone, Default)]
pub struct MemoryLockClient {
    inner: Arc<Inner>,
}

impl MemoryLockClient {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `try_lock` calls made through any clone
    pub fn try_lock_calls(&self) -> usize {
        self.inner.try_lock_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent refresh fail
    pub fn set_fail_refresh(&self, fail: bool) {
        self.inner.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Whether an unexpired lease exists for `key`
    pub fn is_locked(&self, key: &str) -> bool {
        self.inner
            .locks()
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }
}

#[async_trait]
impl LockClient for MemoryLockClient {
    async fn try_lock(&self, key: &str, ttl: Duration) -> LeaseResult<Arc<dyn LockHandle>> {
        self.inner.try_lock_calls.fetch_add(1, Ordering::SeqCst);

        let now = Instant::now();
        let mut locks = self.inner.locks();
        if let Some(entry) = locks.get(key) {
            if entry.expires_at > now {
                return Err(LeaseError::Busy(key.to_string()));
            }
        }

        let token = uuid::Uuid::new_v4().to_string();
        locks.insert(
            key.to_string(),
            Entry {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );

        Ok(Arc::new(MemoryLockHandle {
            inner: self.inner.clone(),
            key: key.to_string(),
            token,
        }))
    }
}

/// Lease held in a [`MemoryLockClient`]
pub struct MemoryLockHandle {
    inner: Arc<Inner>,
    key: String,
    token: String,
}

#[async_trait]
impl LockHandle for MemoryLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    fn token(&self) -> &str {
        &self.token
    }

    async fn refresh(&self, ttl: Duration) -> LeaseResult<()> {
        if self.inner.fail_refresh.load(Ordering::SeqCst) {
            return Err(LeaseError::Backend("refresh rejected".to_string()));
        }

        let now = Instant::now();
        let mut locks = self.inner.locks();
        match locks.get_mut(&self.key) {
            Some(entry) if entry.token == self.token && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(())
            }
            _ => Err(LeaseError::NotHeld(self.key.clone())),
        }
    }

    async fn release(&self) -> LeaseResult<()> {
        let mut locks = self.inner.locks();
        match locks.get(&self.key) {
            Some(entry) if entry.token == self.token => {
                locks.remove(&self.key);
                Ok(())
            }
            _ => Err(LeaseError::NotHeld(self.key.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_holder_is_busy() {
        let client = MemoryLockClient::new();
        let other = client.clone();

        let held = client.try_lock("ranking", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            other.try_lock("ranking", Duration::from_secs(5)).await,
            Err(LeaseError::Busy(_))
        ));
        assert_eq!(client.try_lock_calls(), 2);

        held.release().await.unwrap();
        assert!(!client.is_locked("ranking"));
        other.try_lock("ranking", Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let client = MemoryLockClient::new();
        let first = client.try_lock("ranking", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = client.try_lock("ranking", Duration::from_secs(5)).await.unwrap();
        assert_ne!(first.token(), second.token());
        assert!(matches!(
            first.refresh(Duration::from_secs(5)).await,
            Err(LeaseError::NotHeld(_))
        ));
        assert!(matches!(first.release().await, Err(LeaseError::NotHeld(_))));
        assert!(client.is_locked("ranking"));
    }

    #[tokio::test]
    async fn test_refresh_extends_lease() {
        let client = MemoryLockClient::new();
        let held = client.try_lock("ranking", Duration::from_millis(50)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        held.refresh(Duration::from_millis(200)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(client.is_locked("ranking"));

        client.set_fail_refresh(true);
        assert!(matches!(
            held.refresh(Duration::from_secs(1)).await,
            Err(LeaseError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_refresh_stops_on_failure() {
        let client = MemoryLockClient::new();
        let held = client.try_lock("ranking", Duration::from_secs(1)).await.unwrap();
        client.set_fail_refresh(true);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            held.auto_refresh(
                Duration::from_millis(20),
                Duration::from_secs(1),
                tokio_util::sync::CancellationToken::new(),
            ),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(LeaseError::RenewalFailed(_))));
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_retries() {
        let client = MemoryLockClient::new();
        let _held = client.try_lock("ranking", Duration::from_secs(10)).await.unwrap();

        let policy = crate::utils::RetryPolicy::fixed(3, Duration::from_millis(100));
        let started = Instant::now();
        let result = client
            .acquire(
                "ranking",
                Duration::from_secs(10),
                &policy,
                Duration::from_millis(100),
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(result, Err(LeaseError::Busy(_))));
        assert_eq!(client.try_lock_calls(), 4);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
