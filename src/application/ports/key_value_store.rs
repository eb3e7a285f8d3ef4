use crate::domain::entities::sync::CacheEntry;
use crate::domain::value_objects::sync::{CacheKey, IdentityScope};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// TTL キャッシュの永続化先
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 読めないレコードは `AppError::MalformedCache` を返す
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError>;

    async fn save(&self, entry: CacheEntry) -> Result<(), AppError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), AppError>;

    /// スコープに属する全エントリを削除し、件数を返す
    async fn delete_scope(&self, scope: &IdentityScope) -> Result<u32, AppError>;

    /// `now` 時点で期限切れのエントリを削除し、件数を返す
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u32, AppError>;
}
