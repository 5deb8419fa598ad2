//! Redis lock backend
//!
//! Single-instance Redis lock: `SET key token NX PX ttl` to acquire, and
//! token-checked Lua scripts to refresh and release, so a holder can never
//! touch a lease that has expired and been taken by someone else.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::client::{LockClient, LockHandle};
use super::error::{LeaseError, LeaseResult};

const REFRESH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Redis-backed [`LockClient`]
pub struct RedisLockClient {
    client: redis::Client,
    prefix: String,
}

impl RedisLockClient {
    /// Create a client; no connection is made until the first lock call
    pub fn new(redis_url: &str) -> LeaseResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: "jobwarden:lock:".to_string(),
        })
    }

    /// Namespace for lock keys
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn get_connection(&self) -> LeaseResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LeaseError::Backend(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl LockClient for RedisLockClient {
    async fn try_lock(&self, key: &str, ttl: Duration) -> LeaseResult<Arc<dyn LockHandle>> {
        let mut conn = self.get_connection().await?;
        let redis_key = self.build_key(key);
        let token = uuid::Uuid::new_v4().to_string();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| LeaseError::Backend(format!("Redis SET failed: {}", e)))?;

        if reply.is_none() {
            return Err(LeaseError::Busy(key.to_string()));
        }

        debug!(key = %key, ttl_ms = ttl_millis(ttl), "Lease acquired in Redis");
        Ok(Arc::new(RedisLockHandle {
            conn,
            key: key.to_string(),
            redis_key,
            token,
        }))
    }
}

/// Lease held in Redis
pub struct RedisLockHandle {
    conn: MultiplexedConnection,
    key: String,
    redis_key: String,
    token: String,
}

#[async_trait]
impl LockHandle for RedisLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    fn token(&self) -> &str {
        &self.token
    }

    async fn refresh(&self, ttl: Duration) -> LeaseResult<()> {
        let mut conn = self.conn.clone();
        let refreshed: i64 = redis::cmd("EVAL")
            .arg(REFRESH_SCRIPT)
            .arg(1)
            .arg(&self.redis_key)
            .arg(&self.token)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| LeaseError::Backend(format!("Redis refresh failed: {}", e)))?;

        if refreshed == 0 {
            return Err(LeaseError::NotHeld(self.key.clone()));
        }
        Ok(())
    }

    async fn release(&self) -> LeaseResult<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(&self.redis_key)
            .arg(&self.token)
            .query_async(&mut conn)
            .await
            .map_err(|e| LeaseError::Backend(format!("Redis release failed: {}", e)))?;

        if deleted == 0 {
            return Err(LeaseError::NotHeld(self.key.clone()));
        }
        debug!(key = %self.key, "Lease released in Redis");
        Ok(())
    }
}
