//! Mapping from domain failures to HTTP responses

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use super::ApiResponse;
use crate::domain::DomainError;

/// Handler error. Wraps a [`DomainError`] and renders it with exactly one
/// status code per variant.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::Validation(_) | DomainError::WeakPassword { .. } => StatusCode::BAD_REQUEST,
            DomainError::InvalidCredentials
            | DomainError::MissingToken
            | DomainError::ExpiredToken
            | DomainError::RevokedToken
            | DomainError::MalformedToken(_) => StatusCode::UNAUTHORIZED,
            DomainError::EmailAlreadyExists => StatusCode::CONFLICT,
            DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
            DomainError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            DomainError::DependencyTimeout(_) | DomainError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal details and token parse errors stay
    /// in the logs.
    fn message(&self) -> String {
        match &self.0 {
            DomainError::Internal(_) => "Internal server error".to_string(),
            DomainError::MalformedToken(_) => "Invalid authentication token".to_string(),
            DomainError::DependencyTimeout(_) | DomainError::StoreUnavailable(_) => {
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            DomainError::Internal(detail) => error!(detail = %detail, "Internal error"),
            e if e.is_transient() => warn!(error = %e, "Dependency failure"),
            DomainError::MalformedToken(detail) => warn!(detail = %detail, "Rejected token"),
            _ => {}
        }

        let body = Json(ApiResponse::<()>::error(self.0.code(), self.message()));
        let mut response = (status, body).into_response();

        if let DomainError::RateLimitExceeded { retry_after_secs } = self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
