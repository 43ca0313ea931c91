//! Authentication service, application-layer orchestration
//!
//! HTTP handlers are thin wrappers that delegate here. Every call to the
//! user store is bounded by a deadline; bcrypt runs on the blocking pool.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use validator::ValidateEmail;

use crate::application::security::{RateLimitDecision, RateLimiter, TokenBlacklist};
use crate::domain::{
    CreateUserDto, DomainError, DomainResult, TokenClaims, TokenPair, TokenType, User,
    UserRepositoryInterface,
};
use crate::infrastructure::crypto::{PasswordHasher, TokenIssuer};
use crate::shared::with_deadline;

const USER_STORE: &str = "user store";

/// Result of a credential check.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    TokenIssued { user: User, tokens: TokenPair },
    /// Password was right but a second factor is needed; no token yet.
    TwoFactorRequired { user_id: i64 },
}

/// New access token minted from a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Auth service, orchestrating every identity use-case.
///
/// Generic over `R: UserRepositoryInterface` so it stays decoupled from
/// the concrete persistence layer.
pub struct AuthService<R: UserRepositoryInterface> {
    repo: Arc<R>,
    hasher: PasswordHasher,
    issuer: Arc<TokenIssuer>,
    blacklist: Arc<TokenBlacklist>,
    rate_limiter: Arc<RateLimiter>,
    deadline: Duration,
    /// Hash verified against when the email is unknown, so both failure
    /// paths cost one bcrypt verify.
    dummy_hash: Arc<OnceLock<String>>,
}

impl<R: UserRepositoryInterface + 'static> AuthService<R> {
    pub fn new(
        repo: Arc<R>,
        hasher: PasswordHasher,
        issuer: Arc<TokenIssuer>,
        blacklist: Arc<TokenBlacklist>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            repo,
            hasher,
            issuer,
            blacklist,
            rate_limiter,
            deadline: Duration::from_secs(5),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    // ── Registration ────────────────────────────────────────────

    pub async fn register(&self, email: &str, password: &str) -> DomainResult<User> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(DomainError::Validation("Invalid email address".into()));
        }

        let password_hash = self.hash_password(password).await?;

        if with_deadline(self.deadline, USER_STORE, self.repo.exists_by_email(&email)).await? {
            return Err(DomainError::EmailAlreadyExists);
        }

        let user = with_deadline(
            self.deadline,
            USER_STORE,
            self.repo.create_user(CreateUserDto {
                email,
                password_hash,
            }),
        )
        .await?;

        info!(user_id = user.id, "New user registered");
        Ok(user)
    }

    // ── Authentication ──────────────────────────────────────────

    /// Check email + password. Unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> DomainResult<LoginOutcome> {
        let email = normalize_email(email);
        let user = with_deadline(self.deadline, USER_STORE, self.repo.get_user_by_email(&email)).await?;

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let valid = self.verify_password(password, stored_hash).await?;

        let user = match user {
            Some(user) if valid => user,
            _ => {
                metrics::counter!("auth_logins_total", "outcome" => "invalid_credentials").increment(1);
                warn!("Login failed: invalid credentials");
                return Err(DomainError::InvalidCredentials);
            }
        };

        if user.requires_two_factor() {
            metrics::counter!("auth_logins_total", "outcome" => "two_factor_required").increment(1);
            info!(user_id = user.id, "Login requires second factor");
            return Ok(LoginOutcome::TwoFactorRequired { user_id: user.id });
        }

        let tokens = self.issuer.issue_pair(user.id, &user.email)?;
        metrics::counter!("auth_logins_total", "outcome" => "success").increment(1);
        info!(user_id = user.id, "User logged in");

        Ok(LoginOutcome::TokenIssued { user, tokens })
    }

    /// Revoke an access token and, optionally, the refresh token issued
    /// alongside it. Both are blacklisted until their own expiry.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> DomainResult<()> {
        let claims = self.issuer.verify(access_token)?;
        require_type(&claims, TokenType::Access)?;

        // Check the refresh token before revoking anything so a bad body
        // leaves the session untouched.
        let refresh_claims = match refresh_token {
            Some(token) => {
                let refresh = self.issuer.verify(token)?;
                require_type(&refresh, TokenType::Refresh)?;
                if refresh.user_id != claims.user_id {
                    return Err(DomainError::MalformedToken(
                        "Refresh token belongs to another user".into(),
                    ));
                }
                Some((token, refresh))
            }
            None => None,
        };

        self.blacklist.add(access_token, claims.expires_at()).await?;
        if let Some((token, refresh)) = refresh_claims {
            self.blacklist.add(token, refresh.expires_at()).await?;
        }

        info!(user_id = claims.user_id, "User logged out");
        Ok(())
    }

    /// Mint a new access token from a live, unrevoked refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> DomainResult<RefreshedAccess> {
        let claims = self.issuer.verify(refresh_token)?;
        require_type(&claims, TokenType::Refresh)?;

        if self.blacklist.is_blacklisted(refresh_token).await? {
            return Err(DomainError::RevokedToken);
        }

        let access = self.issuer.issue(claims.user_id, &claims.email, TokenType::Access)?;
        info!(user_id = claims.user_id, "Access token refreshed");

        Ok(RefreshedAccess {
            expires_in: access.claims.exp - access.claims.iat,
            expires_at: access.claims.expires_at(),
            access_token: access.token,
        })
    }

    /// Claims of a usable access token: signed, unexpired, not revoked.
    pub async fn is_token_valid(&self, token: &str) -> DomainResult<TokenClaims> {
        let claims = self.issuer.verify(token)?;
        require_type(&claims, TokenType::Access)?;

        if self.blacklist.is_blacklisted(token).await? {
            return Err(DomainError::RevokedToken);
        }

        Ok(claims)
    }

    pub async fn check_rate_limit(&self, identifier: &str, route: &str) -> DomainResult<RateLimitDecision> {
        self.rate_limiter.check(identifier, route).await
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limiter.is_enabled()
    }

    // ── Profile ─────────────────────────────────────────────────

    pub async fn current_user(&self, user_id: i64) -> DomainResult<User> {
        with_deadline(self.deadline, USER_STORE, self.repo.get_user_by_id(user_id))
            .await?
            .ok_or(DomainError::NotFound {
                entity: "User",
                field: "id",
                value: user_id.to_string(),
            })
    }

    /// Change a user's password. Verifies the current password first.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> DomainResult<()> {
        let user = self.current_user(user_id).await?;

        let valid = self
            .verify_password(current_password, Some(user.password_hash))
            .await?;
        if !valid {
            return Err(DomainError::InvalidCredentials);
        }

        let new_hash = self.hash_password(new_password).await?;
        with_deadline(
            self.deadline,
            USER_STORE,
            self.repo.update_user_password(user_id, &new_hash),
        )
        .await?;

        info!(user_id, "Password changed");
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────

    async fn hash_password(&self, password: &str) -> DomainResult<String> {
        let hasher = self.hasher;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| DomainError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// `None` verifies against a throwaway hash and always yields `false`.
    async fn verify_password(&self, password: &str, hash: Option<String>) -> DomainResult<bool> {
        let hasher = self.hasher;
        let dummy = self.dummy_hash.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                let dummy = dummy.get_or_init(|| {
                    bcrypt::hash("dummy-password-for-timing", hasher.cost()).unwrap_or_default()
                });
                let _ = hasher.verify(&password, dummy);
                false
            }
        })
        .await
        .map_err(|e| DomainError::Internal(format!("Password verify task failed: {}", e)))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require_type(claims: &TokenClaims, expected: TokenType) -> DomainResult<()> {
    if claims.token_type == expected {
        Ok(())
    } else {
        Err(DomainError::MalformedToken(format!(
            "Expected {} token, got {}",
            expected, claims.token_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::application::security::{RateLimitConfig, RateLimitRule};
    use crate::infrastructure::crypto::JwtConfig;
    use crate::infrastructure::{InMemoryCache, InMemoryUserRepository};
    use crate::shared::ManualClock;

    struct Harness {
        service: AuthService<InMemoryUserRepository>,
        repo: Arc<InMemoryUserRepository>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::at_unix(1_699_999_980));
        let cache = Arc::new(InMemoryCache::new(clock.clone()));
        let repo = Arc::new(InMemoryUserRepository::new());

        let issuer = Arc::new(TokenIssuer::new(
            JwtConfig {
                secret: "test-secret-key-that-is-at-least-32-chars".into(),
                issuer: "monera-test".into(),
                access_ttl_secs: 900,
                refresh_ttl_secs: 604_800,
            },
            clock.clone(),
        ));
        let blacklist = Arc::new(TokenBlacklist::new(cache.clone(), clock.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            RateLimitConfig {
                enabled: true,
                global: RateLimitRule::new(100, 60),
                endpoints: HashMap::from([("/api/auth/login".to_string(), RateLimitRule::new(5, 60))]),
            },
            cache,
            clock.clone(),
        ));

        let service = AuthService::new(
            repo.clone(),
            PasswordHasher::new(4, 8),
            issuer,
            blacklist,
            rate_limiter,
        );

        Harness { service, repo, clock }
    }

    async fn login_tokens(service: &AuthService<InMemoryUserRepository>, email: &str, password: &str) -> TokenPair {
        match service.login(email, password).await.unwrap() {
            LoginOutcome::TokenIssued { tokens, .. } => tokens,
            other => panic!("expected tokens, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn register_succeeds_once_per_email() {
        let h = harness();
        let user = h.service.register("a@example.com", "password123").await.unwrap();
        assert_eq!(user.email, "a@example.com");
        assert_ne!(user.password_hash, "password123");

        let err = h.service.register("a@example.com", "password123").await.unwrap_err();
        assert!(matches!(err, DomainError::EmailAlreadyExists));

        // Normalized before the uniqueness check
        let err = h.service.register("  A@Example.COM ", "password123").await.unwrap_err();
        assert!(matches!(err, DomainError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let h = harness();
        assert!(matches!(
            h.service.register("not-an-email", "password123").await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            h.service.register("b@example.com", "short").await,
            Err(DomainError::WeakPassword { min_length: 8 })
        ));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let h = harness();
        h.service.register("a@example.com", "password123").await.unwrap();

        let err = h.service.login("a@example.com", "wrong-password").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials));

        let tokens = login_tokens(&h.service, "A@example.com", "password123").await;
        assert!(!tokens.access_token.is_empty());
        assert!(!tokens.refresh_token.is_empty());
        assert_eq!(tokens.expires_in, 900);
    }

    #[tokio::test]
    async fn unknown_email_looks_like_a_wrong_password() {
        let h = harness();
        let err = h.service.login("nobody@example.com", "password123").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials));
    }

    #[tokio::test]
    async fn two_factor_users_get_no_token() {
        let h = harness();
        let user = h.service.register("a@example.com", "password123").await.unwrap();
        h.repo.set_two_factor(user.id, true).unwrap();

        match h.service.login("a@example.com", "password123").await.unwrap() {
            LoginOutcome::TwoFactorRequired { user_id } => assert_eq!(user_id, user.id),
            other => panic!("expected two-factor challenge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sixth_login_attempt_in_a_window_is_rejected() {
        let h = harness();
        for _ in 0..5 {
            h.service
                .check_rate_limit("10.0.0.1", "/api/auth/login")
                .await
                .unwrap()
                .into_result()
                .unwrap();
        }

        let err = h
            .service
            .check_rate_limit("10.0.0.1", "/api/auth/login")
            .await
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, DomainError::RateLimitExceeded { .. }));

        h.clock.advance(chrono::Duration::seconds(60));
        assert!(h
            .service
            .check_rate_limit("10.0.0.1", "/api/auth/login")
            .await
            .unwrap()
            .into_result()
            .is_ok());
    }

    #[tokio::test]
    async fn logged_out_token_is_revoked() {
        let h = harness();
        h.service.register("a@example.com", "password123").await.unwrap();
        let tokens = login_tokens(&h.service, "a@example.com", "password123").await;

        let claims = h.service.is_token_valid(&tokens.access_token).await.unwrap();
        assert_eq!(claims.email, "a@example.com");

        h.service.logout(&tokens.access_token, None).await.unwrap();
        let err = h.service.is_token_valid(&tokens.access_token).await.unwrap_err();
        assert!(matches!(err, DomainError::RevokedToken));

        // Refresh token was not part of the logout
        assert!(h.service.refresh(&tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn logout_can_revoke_the_refresh_token_too() {
        let h = harness();
        h.service.register("a@example.com", "password123").await.unwrap();
        let tokens = login_tokens(&h.service, "a@example.com", "password123").await;

        h.service
            .logout(&tokens.access_token, Some(&tokens.refresh_token))
            .await
            .unwrap();

        let err = h.service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, DomainError::RevokedToken));
    }

    #[tokio::test]
    async fn token_types_are_not_interchangeable() {
        let h = harness();
        h.service.register("a@example.com", "password123").await.unwrap();
        let tokens = login_tokens(&h.service, "a@example.com", "password123").await;

        assert!(matches!(
            h.service.is_token_valid(&tokens.refresh_token).await,
            Err(DomainError::MalformedToken(_))
        ));
        assert!(matches!(
            h.service.refresh(&tokens.access_token).await,
            Err(DomainError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn refresh_outlives_the_access_token() {
        let h = harness();
        h.service.register("a@example.com", "password123").await.unwrap();
        let tokens = login_tokens(&h.service, "a@example.com", "password123").await;

        h.clock.advance(chrono::Duration::minutes(15));
        assert!(matches!(
            h.service.is_token_valid(&tokens.access_token).await,
            Err(DomainError::ExpiredToken)
        ));

        let refreshed = h.service.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.expires_in, 900);
        let claims = h.service.is_token_valid(&refreshed.access_token).await.unwrap();
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[tokio::test]
    async fn current_user_and_password_change() {
        let h = harness();
        let user = h.service.register("a@example.com", "password123").await.unwrap();

        assert_eq!(h.service.current_user(user.id).await.unwrap().email, "a@example.com");
        assert!(matches!(
            h.service.current_user(user.id + 1).await,
            Err(DomainError::NotFound { .. })
        ));

        assert!(matches!(
            h.service.change_password(user.id, "wrong-password", "new-password-1").await,
            Err(DomainError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.change_password(user.id, "password123", "short").await,
            Err(DomainError::WeakPassword { .. })
        ));

        h.service
            .change_password(user.id, "password123", "new-password-1")
            .await
            .unwrap();
        assert!(matches!(
            h.service.login("a@example.com", "password123").await,
            Err(DomainError::InvalidCredentials)
        ));
        login_tokens(&h.service, "a@example.com", "new-password-1").await;
    }
}
