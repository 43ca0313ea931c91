use async_trait::async_trait;

use super::{CreateUserDto, User};
use crate::shared::DomainResult;

/// Persistence collaborator for users. Lookups by email expect the
/// normalized (lowercase) form.
#[async_trait]
pub trait UserRepositoryInterface: Send + Sync {
    async fn create_user(&self, dto: CreateUserDto) -> DomainResult<User>;

    async fn get_user_by_email(&self, email: &str) -> DomainResult<Option<User>>;
    async fn get_user_by_id(&self, id: i64) -> DomainResult<Option<User>>;
    async fn exists_by_email(&self, email: &str) -> DomainResult<bool>;

    async fn update_user_password(&self, id: i64, new_password_hash: &str) -> DomainResult<()>;
}
