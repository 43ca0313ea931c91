//! Authentication and rate-limit middleware for Axum

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, OriginalUri, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::application::identity::AuthService;
use crate::application::security::RateLimitDecision;
use crate::domain::{DomainError, TokenClaims};
use crate::infrastructure::UserRepository;
use crate::interfaces::http::common::ApiError;

pub type SharedAuthService = Arc<AuthService<UserRepository>>;

const FORWARDED_FOR: &str = "x-forwarded-for";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// State shared by the auth middleware and the auth handlers
#[derive(Clone)]
pub struct AuthState {
    pub service: SharedAuthService,
    /// Honour `X-Forwarded-For` when identifying clients.
    pub trust_forwarded_for: bool,
}

/// Caller identity attached to requests that passed [`auth_middleware`].
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    /// Raw bearer token, kept so logout can revoke it.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims, token: String) -> Self {
        Self {
            expires_at: claims.expires_at(),
            user_id: claims.user_id,
            email: claims.email,
            token,
        }
    }
}

fn extract_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Bearer authentication: the token must be a signed, unexpired,
/// unrevoked access token.
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(String::from);
    let Some(auth_header) = auth_header else {
        return ApiError(DomainError::MissingToken).into_response();
    };

    let Some(token) = extract_token(&auth_header) else {
        return ApiError(DomainError::MalformedToken(
            "Authorization header must use the Bearer scheme".into(),
        ))
        .into_response();
    };

    match auth_state.service.is_token_valid(token).await {
        Ok(claims) => {
            debug!(user_id = claims.user_id, "Request authenticated");
            let user = AuthenticatedUser::from_claims(claims, token.to_string());
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Who a request is counted against: the first `X-Forwarded-For` hop when
/// the proxy is trusted, else the peer address, else `"unknown"`.
pub fn client_identifier(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| request.headers().get(FORWARDED_FOR))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Global + per-endpoint fixed-window limiting. Rejections are 429 with
/// `Retry-After`; allowed responses carry `X-RateLimit-Remaining`.
pub async fn rate_limit_middleware(
    State(auth_state): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_state.service.rate_limiting_enabled() {
        return next.run(request).await;
    }

    let identifier = client_identifier(&request, auth_state.trust_forwarded_for);
    let route = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let remaining = match auth_state.service.check_rate_limit(&identifier, &route).await {
        Ok(RateLimitDecision::Allow { remaining }) => remaining,
        Ok(RateLimitDecision::Reject { retry_after_secs, .. }) => {
            return ApiError(DomainError::RateLimitExceeded { retry_after_secs }).into_response();
        }
        Err(e) => return ApiError(e).into_response(),
    };

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_token("Bearer "), None);
        assert_eq!(extract_token("Basic dXNlcg=="), None);
        assert_eq!(extract_token("abc.def"), None);
    }

    #[test]
    fn identifier_uses_forwarded_for_only_when_trusted() {
        let mut request = Request::builder()
            .uri("/x")
            .header(FORWARDED_FOR, " 203.0.113.7 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 5555))));

        assert_eq!(client_identifier(&request, true), "203.0.113.7");
        assert_eq!(client_identifier(&request, false), "192.168.1.2");
    }

    #[test]
    fn identifier_falls_back_to_peer_then_unknown() {
        let mut request = Request::builder()
            .uri("/x")
            .header(FORWARDED_FOR, "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_identifier(&request, false), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 5555))));
        assert_eq!(client_identifier(&request, false), "192.168.1.2");
    }
}
