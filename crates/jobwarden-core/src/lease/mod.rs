//! Lease-based exclusive execution
//!
//! Timer-driven jobs that must run on one process at a time wrap their work
//! in a [`LeaseGuard`]. The guard is independent of the job store: it only
//! needs a [`LockClient`], backed by Redis in production
//! ([`RedisLockClient`]) or by process memory in tests
//! ([`MemoryLockClient`]).
//!
//! # Example
//!
//! ```ignore
//! use jobwarden_core::lease::{LeaseConfig, LeaseGuard, RedisLockClient};
//!
//! let client = Arc::new(RedisLockClient::new("redis://127.0.0.1/")?);
//! let guard = LeaseGuard::new(client, "job:ranking", LeaseConfig::new())?;
//!
//! match guard.run(|| ranking.top_n()).await? {
//!     TickOutcome::Executed => {}
//!     TickOutcome::Skipped => {} // held by another process
//! }
//!
//! guard.close().await?;
//! ```

mod client;
mod error;
mod guard;
mod memory;
mod redis;

pub use client::{LockClient, LockHandle};
pub use error::{LeaseError, LeaseResult};
pub use guard::{LeaseConfig, LeaseGuard, TickOutcome};
pub use memory::{MemoryLockClient, MemoryLockHandle};
pub use self::redis::{RedisLockClient, RedisLockHandle};
