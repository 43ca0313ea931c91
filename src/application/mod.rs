pub mod identity;
pub mod security;

pub use identity::{AuthService, LoginOutcome, RefreshedAccess};
pub use security::{
    BackendFailurePolicy, BlacklistSweeper, RateLimitConfig, RateLimitDecision, RateLimitRule,
    RateLimiter, TokenBlacklist,
};
