//! Shared cache entry entity

use sea_orm::entity::prelude::*;

/// One key of the database-backed cache. `expires_at` is a Unix timestamp
/// in milliseconds so expiry checks are plain integer comparisons.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cache_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
    pub expires_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
