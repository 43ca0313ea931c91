//! Fixed-window rate limiting
//!
//! Each scope (`global`, or a registered route path) counts requests per
//! client identifier in windows aligned to `floor(now / W) * W`. Counters
//! live in the shared cache, so every instance on the same backend sees
//! the same totals.
//!
//! Up to `2N` requests can pass across a window boundary (N at the end of
//! one window, N at the start of the next).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::SharedCache;
use crate::shared::{with_deadline, DomainError, DomainResult, SharedClock};

const GLOBAL_SCOPE: &str = "global";

/// `max_requests` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u64, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Applied to every route.
    pub global: RateLimitRule,
    /// Additional limits keyed by exact route path.
    pub endpoints: HashMap<String, RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let endpoints = HashMap::from([
            ("/api/auth/register".to_string(), RateLimitRule::new(5, 60)),
            ("/api/auth/login".to_string(), RateLimitRule::new(5, 60)),
            ("/api/auth/refresh".to_string(), RateLimitRule::new(10, 60)),
        ]);
        Self {
            enabled: true,
            global: RateLimitRule::new(100, 60),
            endpoints,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// `remaining` is the tighter of the applicable scopes.
    Allow { remaining: u64 },
    Reject { scope: String, retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn into_result(self) -> DomainResult<u64> {
        match self {
            RateLimitDecision::Allow { remaining } => Ok(remaining),
            RateLimitDecision::Reject {
                retry_after_secs, ..
            } => Err(DomainError::RateLimitExceeded { retry_after_secs }),
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    cache: SharedCache,
    clock: SharedClock,
    deadline: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, cache: SharedCache, clock: SharedClock) -> Self {
        Self {
            config,
            cache,
            clock,
            deadline: Duration::from_secs(5),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Add or replace the limit for one route path.
    pub fn register_endpoint(&mut self, route: impl Into<String>, rule: RateLimitRule) {
        self.config.endpoints.insert(route.into(), rule);
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count one request from `identifier` against the global limit and,
    /// if `route` has one, its endpoint limit. A request rejected by the
    /// global scope is not counted against the endpoint.
    pub async fn check(&self, identifier: &str, route: &str) -> DomainResult<RateLimitDecision> {
        if !self.config.enabled {
            return Ok(RateLimitDecision::Allow {
                remaining: self.config.global.max_requests,
            });
        }

        let mut remaining = match self.check_scope(GLOBAL_SCOPE, identifier, self.config.global).await? {
            RateLimitDecision::Allow { remaining } => remaining,
            reject => return Ok(reject),
        };

        if let Some(rule) = self.config.endpoints.get(route).copied() {
            match self.check_scope(route, identifier, rule).await? {
                RateLimitDecision::Allow { remaining: endpoint } => remaining = remaining.min(endpoint),
                reject => return Ok(reject),
            }
        }

        Ok(RateLimitDecision::Allow { remaining })
    }

    async fn check_scope(
        &self,
        scope: &str,
        identifier: &str,
        rule: RateLimitRule,
    ) -> DomainResult<RateLimitDecision> {
        let window = rule.window_secs.max(1) as i64;
        let now = self.clock.now().timestamp();
        let window_start = now - now.rem_euclid(window);
        let left_in_window = (window_start + window - now) as u64;

        let key = format!("ratelimit:{}:{}:{}", scope, identifier, window_start);
        let count = with_deadline(
            self.deadline,
            "rate limit store",
            self.cache.incr(&key, Duration::from_secs(left_in_window)),
        )
        .await?;
        let count = u64::try_from(count).unwrap_or(0);

        if count > rule.max_requests {
            warn!(scope, identifier, count, "Rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total", "scope" => scope.to_string()).increment(1);
            return Ok(RateLimitDecision::Reject {
                scope: scope.to_string(),
                retry_after_secs: left_in_window,
            });
        }

        debug!(scope, identifier, count, "Rate limit check passed");
        Ok(RateLimitDecision::Allow {
            remaining: rule.max_requests - count,
        })
    }
}
