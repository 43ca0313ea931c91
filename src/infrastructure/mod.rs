//! Infrastructure layer - external concerns

pub mod cache;
pub mod crypto;
pub mod database;
pub mod storage;

pub use cache::{DatabaseCache, InMemoryCache};
pub use crypto::{JwtConfig, PasswordHasher, TokenIssuer};
pub use database::{init_database, run_migrations, DatabaseConfig, UserRepository};
pub use storage::InMemoryUserRepository;
