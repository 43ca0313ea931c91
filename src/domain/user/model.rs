use chrono::{DateTime, Utc};

/// User model
#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    /// Always stored lowercase.
    pub email: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn requires_two_factor(&self) -> bool {
        self.two_factor_enabled
    }
}
