use thiserror::Error;

/// Every failure the auth core can report. The HTTP layer maps each
/// variant to exactly one status code.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation: {0}")]
    Validation(String),

    #[error("Password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailAlreadyExists,

    #[error("Missing authentication token")]
    MissingToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("{0} timed out")]
    DependencyTimeout(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Whether the caller may retry the same operation and expect a
    /// different outcome (the dependency was slow or down).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::DependencyTimeout(_) | DomainError::StoreUnavailable(_)
        )
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::WeakPassword { .. } => "WEAK_PASSWORD",
            DomainError::InvalidCredentials => "INVALID_CREDENTIALS",
            DomainError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            DomainError::MissingToken => "UNAUTHORIZED",
            DomainError::ExpiredToken => "TOKEN_EXPIRED",
            DomainError::RevokedToken => "TOKEN_REVOKED",
            DomainError::MalformedToken(_) => "TOKEN_INVALID",
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            DomainError::DependencyTimeout(_) => "DEPENDENCY_TIMEOUT",
            DomainError::StoreUnavailable(_) => "SERVICE_UNAVAILABLE",
            DomainError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::StoreUnavailable(format!("Database error: {}", e))
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
