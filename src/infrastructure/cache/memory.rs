//! In-memory cache backend

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::CacheStore;
use crate::shared::{DomainError, DomainResult, SharedClock};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-local cache for single-instance deployments and tests.
/// Expired entries are hidden on read and dropped by `purge_expired`.
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
    clock: SharedClock,
}

impl InMemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> DomainResult<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DomainError::Internal(format!("TTL out of range: {}", e)))?;
        Ok(now + ttl)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()> {
        let expires_at = self.expiry(self.clock.now(), ttl)?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> DomainResult<i64> {
        let now = self.clock.now();
        let fresh_expiry = self.expiry(now, ttl)?;

        // The entry guard holds the shard lock, so read-modify-write is atomic.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    entry.value = "1".to_string();
                    entry.expires_at = fresh_expiry;
                    return Ok(1);
                }
                let current: i64 = entry.value.parse().map_err(|_| {
                    DomainError::Internal(format!("Cache value at '{}' is not an integer", key))
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at: fresh_expiry,
                });
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> DomainResult<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| (entry.expires_at - now).to_std().ok()))
    }

    async fn purge_expired(&self) -> DomainResult<usize> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
