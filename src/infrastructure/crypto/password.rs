//! Password hashing utilities

use tracing::warn;

use crate::shared::{DomainError, DomainResult};

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// bcrypt hasher with a fixed cost and a minimum accepted password length.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
    min_length: usize,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST, DEFAULT_MIN_PASSWORD_LENGTH)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32, min_length: usize) -> Self {
        Self { cost, min_length }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted bcrypt hash. Rejects passwords shorter than the configured
    /// minimum or longer than bcrypt can read before doing any work.
    pub fn hash(&self, password: &str) -> DomainResult<String> {
        if password.chars().count() < self.min_length {
            return Err(DomainError::WeakPassword {
                min_length: self.min_length,
            });
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(DomainError::Validation(format!(
                "Password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        bcrypt::hash(password, self.cost)
            .map_err(|e| DomainError::Internal(format!("Failed to hash password: {}", e)))
    }

    /// Constant-time check of `password` against a stored hash. A mismatch,
    /// an over-long password or an unreadable hash is simply `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        if password.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match bcrypt::verify(password, hash) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}
