//! User aggregate
//!
//! Contains the User entity, the create DTO, and the store interface the
//! auth core depends on.

pub mod model;
pub mod repository;

mod dto_create;

pub use model::User;

pub use dto_create::CreateUserDto;

pub use repository::UserRepositoryInterface;
