use crate::application::ports::key_value_store::KeyValueStore;
use crate::domain::entities::sync::CacheEntry;
use crate::domain::value_objects::sync::{CacheKey, IdentityScope};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// プロセス内メモリのキー・バリューストア（再起動で消える）
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャッシュサイズを取得
    pub async fn size(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn save(&self, entry: CacheEntry) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.key.as_str().to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.remove(key.as_str());
        Ok(())
    }

    async fn delete_scope(&self, scope: &IdentityScope) -> Result<u32, AppError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.key.scope() != scope);
        Ok((before - entries.len()) as u32)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u32, AppError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        Ok((before - entries.len()) as u32)
    }
}
