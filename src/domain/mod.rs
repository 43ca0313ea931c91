pub mod cache;
pub mod token;
pub mod user;

// Re-export commonly used types
pub use cache::{CacheStore, SharedCache};
pub use token::{IssuedToken, TokenClaims, TokenPair, TokenType};
pub use user::{CreateUserDto, User, UserRepositoryInterface};

pub use crate::shared::errors::{DomainError, DomainResult};
