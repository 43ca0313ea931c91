//! Session token types
//!
//! Claims are a plain record; signing and decoding live in
//! `infrastructure::crypto::jwt`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access tokens authorize API calls; refresh tokens only mint new access
/// tokens. The two are never interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub email: String,
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    pub iss: String,
}

impl TokenClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Usable strictly before `exp`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// Access + refresh token handed out at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(access: IssuedToken, refresh: IssuedToken) -> Self {
        Self {
            expires_in: access.claims.exp - access.claims.iat,
            expires_at: access.claims.expires_at(),
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> TokenClaims {
        TokenClaims {
            user_id: 1,
            email: "a@example.com".into(),
            token_type: TokenType::Access,
            iat: exp - 900,
            exp,
            jti: "jti".into(),
            iss: "monera".into(),
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let c = claims(1_000);
        assert!(!c.is_expired_at(DateTime::from_timestamp(999, 0).unwrap()));
        assert!(c.is_expired_at(DateTime::from_timestamp(1_000, 0).unwrap()));
        assert!(c.is_expired_at(DateTime::from_timestamp(1_001, 0).unwrap()));
    }

    #[test]
    fn token_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TokenType::Refresh).unwrap(), "\"refresh\"");
        let parsed: TokenType = serde_json::from_str("\"access\"").unwrap();
        assert_eq!(parsed, TokenType::Access);
    }
}
