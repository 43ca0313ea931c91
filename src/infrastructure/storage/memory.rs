//! In-memory user store

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{CreateUserDto, DomainError, DomainResult, User, UserRepositoryInterface};

/// In-memory user store for development and testing
pub struct InMemoryUserRepository {
    users: DashMap<i64, User>,
    ids_by_email: DashMap<String, i64>,
    id_counter: AtomicI64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            ids_by_email: DashMap::new(),
            id_counter: AtomicI64::new(1),
        }
    }

    /// Toggle two-factor for a stored user. There is no HTTP surface for
    /// this yet, so tests and fixtures flip it directly.
    pub fn set_two_factor(&self, id: i64, enabled: bool) -> DomainResult<()> {
        let mut user = self.users.get_mut(&id).ok_or_else(|| DomainError::NotFound {
            entity: "User",
            field: "id",
            value: id.to_string(),
        })?;
        user.two_factor_enabled = enabled;
        user.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepositoryInterface for InMemoryUserRepository {
    async fn create_user(&self, dto: CreateUserDto) -> DomainResult<User> {
        // Claiming the email slot first makes concurrent registrations of
        // the same address race on a single shard lock.
        let id = match self.ids_by_email.entry(dto.email.clone()) {
            Entry::Occupied(_) => return Err(DomainError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
                slot.insert(id);
                id
            }
        };

        let now = Utc::now();
        let user = User {
            id,
            email: dto.email,
            password_hash: dto.password_hash,
            two_factor_enabled: false,
            two_factor_secret: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let Some(id) = self.ids_by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_id(&self, id: i64) -> DomainResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn exists_by_email(&self, email: &str) -> DomainResult<bool> {
        Ok(self.ids_by_email.contains_key(email))
    }

    async fn update_user_password(&self, id: i64, new_password_hash: &str) -> DomainResult<()> {
        let mut user = self.users.get_mut(&id).ok_or_else(|| DomainError::NotFound {
            entity: "User",
            field: "id",
            value: id.to_string(),
        })?;
        user.password_hash = new_password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }
}
