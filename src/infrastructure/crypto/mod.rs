//! Password hashing and token signing

pub mod jwt;
pub mod password;

pub use jwt::{JwtConfig, TokenIssuer};
pub use password::PasswordHasher;
