//! JWT Token handling

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use tracing::warn;

use crate::domain::{IssuedToken, TokenClaims, TokenPair, TokenType};
use crate::shared::{DomainError, DomainResult, SharedClock};

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Issuer claim
    pub issuer: String,
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "monera".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 3600,
        }
    }
}

impl JwtConfig {
    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => Duration::seconds(self.access_ttl_secs),
            TokenType::Refresh => Duration::seconds(self.refresh_ttl_secs),
        }
    }

    /// Replace an empty secret with a random one. Tokens signed with it do
    /// not survive a restart.
    pub fn with_secret_or_ephemeral(mut self) -> Self {
        if self.secret.trim().is_empty() {
            warn!("No JWT secret configured; generating an ephemeral one");
            let bytes: [u8; 32] = rand::thread_rng().gen();
            self.secret = hex::encode(bytes);
        }
        self
    }
}

/// Mints and checks signed session tokens. Revocation is not its concern.
pub struct TokenIssuer {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: SharedClock,
}

impl TokenIssuer {
    pub fn new(config: JwtConfig, clock: SharedClock) -> Self {
        let config = config.with_secret_or_ephemeral();
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            config,
            clock,
        }
    }

    /// Sign a token of `token_type` for a user, valid for that type's TTL.
    pub fn issue(&self, user_id: i64, email: &str, token_type: TokenType) -> DomainResult<IssuedToken> {
        let now = self.clock.now();
        let claims = TokenClaims {
            user_id,
            email: email.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + self.config.ttl(token_type)).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.config.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DomainError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    pub fn issue_pair(&self, user_id: i64, email: &str) -> DomainResult<TokenPair> {
        let access = self.issue(user_id, email, TokenType::Access)?;
        let refresh = self.issue(user_id, email, TokenType::Refresh)?;
        Ok(TokenPair::new(access, refresh))
    }

    /// Check signature, structure and issuer, then expiry against the
    /// injected clock (no leeway).
    pub fn verify(&self, token: &str) -> DomainResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| DomainError::MalformedToken(e.to_string()))?
            .claims;

        if claims.is_expired_at(self.clock.now()) {
            return Err(DomainError::ExpiredToken);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::shared::ManualClock;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-that-is-at-least-32-chars".into(),
            issuer: "monera-test".into(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
        }
    }

    fn issuer_with_clock() -> (TokenIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        (TokenIssuer::new(config(), clock.clone()), clock)
    }

    #[test]
    fn test_issue_and_verify_token() {
        let (issuer, _) = issuer_with_clock();
        let issued = issuer.issue(42, "a@example.com", TokenType::Access).unwrap();

        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn token_is_valid_until_exp_then_expired() {
        let (issuer, clock) = issuer_with_clock();
        let issued = issuer.issue(1, "a@example.com", TokenType::Access).unwrap();

        clock.advance(Duration::seconds(899));
        assert!(issuer.verify(&issued.token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(issuer.verify(&issued.token), Err(DomainError::ExpiredToken)));
    }

    #[test]
    fn refresh_tokens_live_longer() {
        let (issuer, clock) = issuer_with_clock();
        let pair = issuer.issue_pair(7, "b@example.com").unwrap();
        assert_eq!(pair.expires_in, 900);
        assert_eq!(pair.token_type, "Bearer");
        assert_ne!(pair.access_token, pair.refresh_token);

        clock.advance(Duration::hours(1));
        assert!(matches!(issuer.verify(&pair.access_token), Err(DomainError::ExpiredToken)));
        let refresh = issuer.verify(&pair.refresh_token).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
    }

    #[test]
    fn tokens_minted_in_the_same_second_differ() {
        let (issuer, _) = issuer_with_clock();
        let a = issuer.issue(1, "a@example.com", TokenType::Access).unwrap();
        let b = issuer.issue(1, "a@example.com", TokenType::Access).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_invalid_token() {
        let (issuer, _) = issuer_with_clock();
        assert!(matches!(issuer.verify("invalid-token"), Err(DomainError::MalformedToken(_))));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_malformed() {
        let (issuer, clock) = issuer_with_clock();
        let issued = issuer.issue(1, "a@example.com", TokenType::Access).unwrap();

        let mut tampered = issued.token.clone();
        tampered.pop();
        tampered.push(if issued.token.ends_with('A') { 'B' } else { 'A' });
        assert!(matches!(issuer.verify(&tampered), Err(DomainError::MalformedToken(_))));

        let other = TokenIssuer::new(
            JwtConfig {
                secret: "a-completely-different-signing-secret".into(),
                ..config()
            },
            clock.clone(),
        );
        assert!(matches!(other.verify(&issued.token), Err(DomainError::MalformedToken(_))));

        let other_issuer = TokenIssuer::new(
            JwtConfig {
                issuer: "someone-else".into(),
                ..config()
            },
            clock,
        );
        assert!(matches!(other_issuer.verify(&issued.token), Err(DomainError::MalformedToken(_))));
    }

    #[test]
    fn empty_secret_is_replaced() {
        let cfg = JwtConfig {
            secret: String::new(),
            ..config()
        }
        .with_secret_or_ephemeral();
        assert_eq!(cfg.secret.len(), 64);
    }
}
