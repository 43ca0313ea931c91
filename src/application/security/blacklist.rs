//! Token revocation list
//!
//! Entries are keyed by the SHA-256 of the raw token so the store never
//! holds a usable credential, and live exactly as long as the token would.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::SharedCache;
use crate::shared::{with_deadline, DomainResult, SharedClock, ShutdownSignal};

const KEY_PREFIX: &str = "token:blacklist:";

/// What `is_blacklisted` does when the cache cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFailurePolicy {
    /// Report the failure; the request is refused.
    #[default]
    FailClosed,
    /// Log and treat the token as not revoked.
    FailOpen,
}

pub struct TokenBlacklist {
    cache: SharedCache,
    clock: SharedClock,
    policy: BackendFailurePolicy,
    deadline: Duration,
}

impl TokenBlacklist {
    pub fn new(cache: SharedCache, clock: SharedClock) -> Self {
        Self {
            cache,
            clock,
            policy: BackendFailurePolicy::default(),
            deadline: Duration::from_secs(5),
        }
    }

    pub fn with_policy(mut self, policy: BackendFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn key(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("{}{}", KEY_PREFIX, hex::encode(digest))
    }

    /// Revoke `token` until `expiry`. Repeated calls are harmless; an
    /// expiry already in the past stores nothing.
    pub async fn add(&self, token: &str, expiry: DateTime<Utc>) -> DomainResult<()> {
        let remaining = expiry - self.clock.now();
        let Ok(ttl) = remaining.to_std() else {
            debug!("Token already expired, not blacklisting");
            return Ok(());
        };
        if ttl.is_zero() {
            return Ok(());
        }

        with_deadline(self.deadline, "token blacklist", self.cache.set(&Self::key(token), "1", ttl)).await
    }

    pub async fn is_blacklisted(&self, token: &str) -> DomainResult<bool> {
        let lookup = with_deadline(self.deadline, "token blacklist", self.cache.get(&Self::key(token))).await;

        match lookup {
            Ok(entry) => Ok(entry.is_some()),
            Err(e) if self.policy == BackendFailurePolicy::FailOpen => {
                warn!(error = %e, "Blacklist unavailable; accepting token (fail-open)");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop expired entries. The store is shared with rate-limit counters,
    /// so their stale windows go too.
    pub async fn sweep(&self) -> DomainResult<usize> {
        let removed = with_deadline(self.deadline, "token blacklist", self.cache.purge_expired()).await?;
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
            metrics::counter!("blacklist_swept_total").increment(removed as u64);
        }
        Ok(removed)
    }
}

/// Background task calling [`TokenBlacklist::sweep`] on a fixed interval
/// until shutdown.
pub struct BlacklistSweeper {
    blacklist: Arc<TokenBlacklist>,
    interval: Duration,
}

impl BlacklistSweeper {
    pub fn new(blacklist: Arc<TokenBlacklist>, interval: Duration) -> Self {
        Self { blacklist, interval }
    }

    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Blacklist sweeper started");

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.blacklist.sweep().await {
                            warn!(error = %e, "Blacklist sweep failed");
                        }
                    }
                    _ = shutdown.wait() => {
                        info!("Blacklist sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::security::test_support::{StalledCache, UnavailableCache};
    use crate::domain::CacheStore;
    use crate::infrastructure::InMemoryCache;
    use crate::shared::{Clock, DomainError, ManualClock};

    fn setup() -> (TokenBlacklist, Arc<InMemoryCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let cache = Arc::new(InMemoryCache::new(clock.clone()));
        (TokenBlacklist::new(cache.clone(), clock.clone()), cache, clock)
    }

    #[tokio::test]
    async fn test_add_and_check() {
        let (blacklist, _, clock) = setup();
        let expiry = clock.now() + chrono::Duration::minutes(15);

        assert!(!blacklist.is_blacklisted("tok").await.unwrap());
        blacklist.add("tok", expiry).await.unwrap();
        blacklist.add("tok", expiry).await.unwrap();
        assert!(blacklist.is_blacklisted("tok").await.unwrap());
        assert!(!blacklist.is_blacklisted("other").await.unwrap());
    }

    #[tokio::test]
    async fn raw_token_is_never_stored() {
        let (blacklist, cache, clock) = setup();
        blacklist
            .add("secret.jwt.value", clock.now() + chrono::Duration::minutes(1))
            .await
            .unwrap();

        let key = TokenBlacklist::key("secret.jwt.value");
        assert!(key.starts_with("token:blacklist:"));
        assert_eq!(key.len(), KEY_PREFIX.len() + 64);
        assert!(!key.contains("secret"));
        assert_eq!(cache.ttl(&key).await.unwrap(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn past_expiry_is_a_no_op() {
        let (blacklist, cache, clock) = setup();
        blacklist.add("tok", clock.now() - chrono::Duration::seconds(1)).await.unwrap();
        blacklist.add("tok2", clock.now()).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_swept() {
        let (blacklist, cache, clock) = setup();
        blacklist.add("short", clock.now() + chrono::Duration::seconds(10)).await.unwrap();
        blacklist.add("long", clock.now() + chrono::Duration::hours(1)).await.unwrap();

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(blacklist.sweep().await.unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(blacklist.is_blacklisted("long").await.unwrap());
    }

    #[tokio::test]
    async fn backend_failure_closes_by_default() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let blacklist = TokenBlacklist::new(Arc::new(UnavailableCache), clock);
        assert!(matches!(
            blacklist.is_blacklisted("tok").await,
            Err(DomainError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn backend_failure_can_fail_open() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let blacklist = TokenBlacklist::new(Arc::new(UnavailableCache), clock)
            .with_policy(BackendFailurePolicy::FailOpen);
        assert!(!blacklist.is_blacklisted("tok").await.unwrap());
    }

    #[tokio::test]
    async fn slow_backend_hits_the_deadline() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let blacklist = TokenBlacklist::new(Arc::new(StalledCache), clock.clone())
            .with_deadline(Duration::from_millis(50));

        let err = blacklist
            .add("tok", clock.now() + chrono::Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DependencyTimeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn sweeper_runs_until_shutdown() {
        let (blacklist, cache, clock) = setup();
        blacklist.add("tok", clock.now() + chrono::Duration::seconds(1)).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));

        let shutdown = ShutdownSignal::new();
        let handle = BlacklistSweeper::new(Arc::new(blacklist), Duration::from_millis(10))
            .start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
