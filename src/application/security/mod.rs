//! Token revocation and request throttling

pub mod blacklist;
pub mod rate_limit;

pub use blacklist::{BackendFailurePolicy, BlacklistSweeper, TokenBlacklist};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitRule, RateLimiter};
