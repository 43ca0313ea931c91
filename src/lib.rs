//! # Monera authentication service
//!
//! Credential handling and session tokens for the Monera platform.
//!
//! ## Architecture
//!
//! - **domain**: Users, token claims and the cache capability
//! - **application**: Auth orchestration, token blacklist and rate limiting
//! - **infrastructure**: bcrypt, JWT signing, SeaORM persistence and cache backends
//! - **interfaces**: REST API with Swagger documentation
//! - **shared**: Errors, clock, deadlines and shutdown plumbing

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig, ConfigError};

// Re-export database types for easy access
pub use infrastructure::{init_database, run_migrations, DatabaseConfig};

// Re-export API router
pub use interfaces::http::{create_api_router, ApiDoc, AppState};

pub use server::{init_tracing, ServerHandle, ServerOptions};
