//! Per-call deadlines for collaborator I/O
//!
//! The auth core never retries. A slow user store or cache is cut off
//! after a fixed budget and reported as `DependencyTimeout`, leaving any
//! retry policy to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::shared::errors::{DomainError, DomainResult};

/// Await `operation`, failing with [`DomainError::DependencyTimeout`] if it
/// does not finish within `limit`.
pub async fn with_deadline<T, Fut>(
    limit: Duration,
    dependency: &'static str,
    operation: Fut,
) -> DomainResult<T>
where
    Fut: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                dependency,
                timeout_ms = limit.as_millis() as u64,
                "Dependency call exceeded its deadline"
            );
            Err(DomainError::DependencyTimeout(dependency.to_string()))
        }
    }
}
