//! Database entities module

pub mod cache_entry;
pub mod user;

pub use cache_entry::Entity as CacheEntry;
pub use user::Entity as User;
