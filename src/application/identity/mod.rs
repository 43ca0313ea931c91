//! Identity module: registration, login and session lifecycle
//!
//! Contains the `AuthService` which orchestrates the password hasher,
//! token issuer, blacklist and rate limiter around the user store.

pub mod service;

pub use service::{AuthService, LoginOutcome, RefreshedAccess};
