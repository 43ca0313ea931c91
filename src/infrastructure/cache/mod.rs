//! Cache backends for the token blacklist and rate-limit counters

pub mod database;
pub mod memory;

pub use database::DatabaseCache;
pub use memory::InMemoryCache;
