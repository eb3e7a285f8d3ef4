use crate::application::ports::key_value_store::KeyValueStore;
use crate::domain::entities::sync::CacheEntry;
use crate::domain::value_objects::sync::{CacheKey, IdentityScope};
use crate::infrastructure::database::connection_pool::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;
use std::time::Duration;

const SELECT_CACHE_ENTRY: &str = r#"
    SELECT key, scope, value, stored_at, ttl_ms
    FROM cache_entries
    WHERE key = ?
"#;

const UPSERT_CACHE_ENTRY: &str = r#"
    INSERT INTO cache_entries (key, scope, value, stored_at, ttl_ms)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        scope = excluded.scope,
        value = excluded.value,
        stored_at = excluded.stored_at,
        ttl_ms = excluded.ttl_ms
"#;

const DELETE_CACHE_ENTRY: &str = "DELETE FROM cache_entries WHERE key = ?";

const DELETE_CACHE_SCOPE: &str = "DELETE FROM cache_entries WHERE scope = ?";

const DELETE_EXPIRED_CACHE_ENTRIES: &str =
    "DELETE FROM cache_entries WHERE stored_at + ttl_ms <= ?";

#[derive(Debug, FromRow)]
struct CacheEntryRow {
    key: String,
    scope: String,
    value: String,
    stored_at: i64,
    ttl_ms: i64,
}

impl CacheEntryRow {
    fn into_domain(self) -> Result<CacheEntry, AppError> {
        let scope = IdentityScope::new(self.scope)
            .map_err(|_| AppError::MalformedCache(format!("Missing scope for {}", self.key)))?;
        let stored_at = Utc
            .timestamp_millis_opt(self.stored_at)
            .single()
            .ok_or_else(|| {
                AppError::MalformedCache(format!("Invalid stored_at for {}", self.key))
            })?;
        let ttl_ms = u64::try_from(self.ttl_ms)
            .map_err(|_| AppError::MalformedCache(format!("Negative ttl for {}", self.key)))?;
        let key = CacheKey::from_stored(self.key, scope).map_err(AppError::MalformedCache)?;

        Ok(CacheEntry::new(
            key,
            self.value,
            stored_at,
            Duration::from_millis(ttl_ms),
        ))
    }
}

/// 再起動後も残る SQLite ベースのキー・バリューストア
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: ConnectionPool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// 接続してスキーマを適用する
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = ConnectionPool::new(database_url).await?;
        pool.migrate().await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError> {
        let row = sqlx::query_as::<_, CacheEntryRow>(SELECT_CACHE_ENTRY)
            .bind(key.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;

        row.map(CacheEntryRow::into_domain).transpose()
    }

    async fn save(&self, entry: CacheEntry) -> Result<(), AppError> {
        let ttl_ms = i64::try_from(entry.ttl.as_millis()).unwrap_or(i64::MAX);
        sqlx::query(UPSERT_CACHE_ENTRY)
            .bind(entry.key.as_str())
            .bind(entry.key.scope().as_str())
            .bind(&entry.value)
            .bind(entry.stored_at.timestamp_millis())
            .bind(ttl_ms)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), AppError> {
        sqlx::query(DELETE_CACHE_ENTRY)
            .bind(key.as_str())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn delete_scope(&self, scope: &IdentityScope) -> Result<u32, AppError> {
        let result = sqlx::query(DELETE_CACHE_SCOPE)
            .bind(scope.as_str())
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() as u32)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u32, AppError> {
        let result = sqlx::query(DELETE_EXPIRED_CACHE_ENTRIES)
            .bind(now.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() as u32)
    }
}
