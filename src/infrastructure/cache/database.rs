//! Database-backed cache shared by every instance using the same database

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Func, OnConflict, Query, SimpleExpr};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::domain::CacheStore;
use crate::infrastructure::database::entities::cache_entry;
use crate::shared::{DomainError, DomainResult, SharedClock};

pub struct DatabaseCache {
    db: DatabaseConnection,
    clock: SharedClock,
}

impl DatabaseCache {
    pub fn new(db: DatabaseConnection, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::StoreUnavailable(format!("Cache database error: {}", e))
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CacheStore for DatabaseCache {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let now = self.now_millis();
        let entry = cache_entry::Entity::find_by_id(key.to_string())
            .filter(cache_entry::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(entry.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()> {
        let expires_at = self.now_millis().saturating_add(ttl_millis(ttl));
        let entry = cache_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expires_at),
        };

        cache_entry::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(cache_entry::Column::Key)
                    .update_columns([cache_entry::Column::Value, cache_entry::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        cache_entry::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> DomainResult<i64> {
        use cache_entry::Column;

        let now = self.now_millis();
        let fresh_expiry = now.saturating_add(ttl_millis(ttl));

        // One upsert so concurrent callers serialize on the row: a live
        // entry is bumped, an expired one restarts at 1 with a fresh expiry.
        let live = Expr::col((cache_entry::Entity, Column::ExpiresAt)).gt(now);
        let bumped = Func::cast_as(
            Expr::expr(Func::cast_as(
                Expr::col((cache_entry::Entity, Column::Value)),
                Alias::new("INTEGER"),
            ))
            .add(1),
            Alias::new("TEXT"),
        );
        let next_value: SimpleExpr = Expr::case(live.clone(), bumped).finally("1").into();
        let next_expiry: SimpleExpr = Expr::case(live, Expr::col((cache_entry::Entity, Column::ExpiresAt)))
            .finally(fresh_expiry)
            .into();

        let mut upsert = Query::insert();
        upsert
            .into_table(cache_entry::Entity)
            .columns([Column::Key, Column::Value, Column::ExpiresAt])
            .values([key.into(), "1".into(), fresh_expiry.into()])
            .map_err(|e| DomainError::Internal(format!("Failed to build counter upsert: {}", e)))?
            .on_conflict(
                OnConflict::column(Column::Key)
                    .value(Column::Value, next_value)
                    .value(Column::ExpiresAt, next_expiry)
                    .to_owned(),
            )
            .returning_col(Column::Value);

        let statement = self.db.get_database_backend().build(&upsert);
        let row = self
            .db
            .query_one(statement)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::StoreUnavailable("Counter upsert returned no row".into()))?;

        let value: String = row.try_get("", "value").map_err(db_err)?;
        value.parse().map_err(|_| {
            DomainError::Internal(format!("Cache value at '{}' is not an integer", key))
        })
    }

    async fn ttl(&self, key: &str) -> DomainResult<Option<Duration>> {
        let now = self.now_millis();
        let entry = cache_entry::Entity::find_by_id(key.to_string())
            .filter(cache_entry::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(entry.map(|e| Duration::from_millis((e.expires_at - now) as u64)))
    }

    async fn purge_expired(&self) -> DomainResult<usize> {
        let result = cache_entry::Entity::delete_many()
            .filter(cache_entry::Column::ExpiresAt.lte(self.now_millis()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::database::{init_database, run_migrations, test_database, DatabaseConfig};
    use crate::shared::{ManualClock, SystemClock};

    async fn cache() -> (DatabaseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        (DatabaseCache::new(test_database().await, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_overwrites_and_expires() {
        let (cache, clock) = cache().await;
        cache.set("k", "one", Duration::from_secs(10)).await.unwrap();
        cache.set("k", "two", Duration::from_secs(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("two"));

        clock.advance(chrono::Duration::seconds(15));
        assert_eq!(cache.ttl("k").await.unwrap(), Some(Duration::from_secs(5)));

        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.delete("k").await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn incr_counts_within_expiry_and_restarts_after() {
        let (cache, clock) = cache().await;
        for expected in 1..=3 {
            assert_eq!(cache.incr("c", Duration::from_secs(60)).await.unwrap(), expected);
        }

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.incr("c", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.ttl("c").await.unwrap(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn purge_removes_expired_rows() {
        let (cache, clock) = cache().await;
        cache.set("a", "1", Duration::from_secs(1)).await.unwrap();
        cache.set("b", "1", Duration::from_secs(1)).await.unwrap();
        cache.set("c", "1", Duration::from_secs(100)).await.unwrap();

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_incr_on_a_pooled_file_database_counts_every_call() {
        let path = std::env::temp_dir().join(format!("monera-cache-{}.db", uuid::Uuid::new_v4()));
        let mut config = DatabaseConfig::sqlite(&path.to_string_lossy());
        config.max_connections = 10;

        let db = init_database(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        let cache = Arc::new(DatabaseCache::new(db.clone(), SystemClock::shared()));

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.incr("hot", Duration::from_secs(60)).await })
            })
            .collect();

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=40).collect::<Vec<i64>>());
        assert_eq!(cache.get("hot").await.unwrap().as_deref(), Some("40"));

        db.close().await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn incr_keeps_the_first_expiry() {
        let (cache, clock) = cache().await;
        cache.incr("c", Duration::from_secs(60)).await.unwrap();

        clock.advance(chrono::Duration::seconds(20));
        assert_eq!(cache.incr("c", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(cache.ttl("c").await.unwrap(), Some(Duration::from_secs(40)));
    }
}
