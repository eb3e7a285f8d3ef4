use crate::application::ports::clock::Clock;
use crate::application::ports::key_value_store::KeyValueStore;
use crate::domain::entities::sync::CacheEntry;
use crate::domain::value_objects::sync::{CacheKey, IdentityScope};
use crate::shared::error::AppError;
use crate::shared::metrics::SyncMetrics;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// 永続ストアの上に載る TTL 付きキャッシュ。
///
/// 期限切れは読み取り時に判定する。読めない値は削除してミス扱いにする。
/// ストアがない（無効化されている）場合はすべての読み取りがミスになり、
/// 書き込みは何もしない。
#[derive(Clone)]
pub struct TtlCache {
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    read_timeout: Duration,
    metrics: Arc<SyncMetrics>,
}

impl TtlCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
        read_timeout: Duration,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store: Some(store),
            clock,
            default_ttl,
            read_timeout,
            metrics,
        }
    }

    /// 永続化なしのキャッシュ
    pub fn disabled(clock: Arc<dyn Clock>, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            store: None,
            clock,
            default_ttl: Duration::ZERO,
            read_timeout: Duration::ZERO,
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 有効期限内の値を取得
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.read_entry(key).await?;
        if !entry.is_valid_at(self.clock.now()) {
            debug!(key = %key, "cache entry expired");
            self.metrics.cache_reads.record_failure();
            return None;
        }

        let value = self.decode(&entry).await;
        if value.is_some() {
            self.metrics.cache_reads.record_success();
        } else {
            self.metrics.cache_reads.record_failure();
        }
        value
    }

    /// 期限を無視して取得する。リモートが使えないときの最後の手段。
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.read_entry(key).await?;
        self.decode(&entry).await
    }

    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let Some(store) = &self.store else {
            return;
        };

        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to serialize cache value");
                return;
            }
        };

        let entry = CacheEntry::new(key.clone(), serialized, self.clock.now(), ttl);
        if let Err(err) = store.save(entry).await {
            warn!(key = %key, error = %err, "failed to write cache entry");
        }
    }

    pub async fn set_default<T: Serialize>(&self, key: &CacheKey, value: &T) {
        self.set(key, value, self.default_ttl).await;
    }

    pub async fn remove(&self, key: &CacheKey) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.delete(key).await {
            warn!(key = %key, error = %err, "failed to remove cache entry");
        }
    }

    /// 指定ユーザーのエントリをすべて削除する（サインアウト時）
    pub async fn clear_scope(&self, scope: &IdentityScope) -> u32 {
        let Some(store) = &self.store else {
            return 0;
        };
        match store.delete_scope(scope).await {
            Ok(removed) => {
                debug!(scope = %scope, removed, "cleared cache scope");
                removed
            }
            Err(err) => {
                warn!(scope = %scope, error = %err, "failed to clear cache scope");
                0
            }
        }
    }

    /// 期限切れエントリを掃除する
    pub async fn cleanup_expired(&self) -> u32 {
        let Some(store) = &self.store else {
            return 0;
        };
        match store.delete_expired(self.clock.now()).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, "failed to clean up expired cache entries");
                0
            }
        }
    }

    async fn read_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let Some(store) = &self.store else {
            self.metrics.cache_reads.record_failure();
            return None;
        };

        let loaded = match timeout(self.read_timeout, store.load(key)).await {
            Ok(loaded) => loaded,
            Err(_) => Err(AppError::timeout(format!("cache read {key}"))),
        };

        match loaded {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                self.metrics.cache_reads.record_failure();
                None
            }
            Err(AppError::MalformedCache(reason)) => {
                warn!(key = %key, reason = %reason, "dropping malformed cache entry");
                self.metrics.cache_reads.record_failure();
                self.remove(key).await;
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed");
                self.metrics.cache_reads.record_failure();
                None
            }
        }
    }

    async fn decode<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Option<T> {
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %entry.key, error = %err, "dropping undecodable cache entry");
                self.remove(&entry.key).await;
                None
            }
        }
    }
}
