//! Key/value cache capability
//!
//! The token blacklist and rate-limit counters are written against this
//! trait only. Backends live in `infrastructure::cache`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::shared::DomainResult;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    /// Insert or overwrite `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()>;

    async fn delete(&self, key: &str) -> DomainResult<()>;

    /// Atomically add one to the integer at `key` and return the new value.
    /// A missing or expired key starts from zero and gets `ttl`; an existing
    /// key keeps its expiry.
    async fn incr(&self, key: &str, ttl: Duration) -> DomainResult<i64>;

    /// Time left before `key` expires, `None` if missing or expired.
    async fn ttl(&self, key: &str) -> DomainResult<Option<Duration>>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> DomainResult<usize>;
}

pub type SharedCache = Arc<dyn CacheStore>;
