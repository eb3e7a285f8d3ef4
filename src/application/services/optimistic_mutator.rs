use crate::domain::entities::sync::{FeedItem, ItemPatch};
use crate::domain::value_objects::sync::{CacheKey, FieldSet, MutationId};
use crate::infrastructure::cache::TtlCache;
use crate::shared::error::AppError;
use crate::shared::metrics::SyncMetrics;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// ローカル状態への楽観的な変更（純粋関数）
pub type LocalUpdate = dyn Fn(&FeedItem) -> FeedItem + Send + Sync;

/// 実行中のミューテーション。スナップショットは開始直前の値。
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub entity_id: String,
    pub snapshot: FeedItem,
    pub fields: FieldSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// サーバー確定値を現在の値に適用する
    Commit(ItemPatch),
    /// スナップショットへ戻す
    Rollback(FeedItem),
}

/// 楽観的更新を受け付ける保持者（フィードなど）
#[async_trait]
pub trait MutationTarget: Send + Sync {
    /// スナップショット取得・ローカル更新・実行中フィールドの登録を一度に行う。
    /// エンティティが存在しなければ `None`。
    async fn begin(
        &self,
        entity_id: &str,
        fields: &FieldSet,
        update: &LocalUpdate,
    ) -> Option<PendingMutation>;

    /// 登録を外して結果を反映する。エンティティが既にない場合は何もせず `false`。
    async fn settle(&self, pending: &PendingMutation, settlement: Settlement) -> bool;

    /// 確定後に無効化するキャッシュキー
    fn invalidation_keys(&self) -> Vec<CacheKey>;
}

#[derive(Clone)]
pub struct OptimisticMutator {
    cache: TtlCache,
    mutation_timeout: Duration,
    metrics: Arc<SyncMetrics>,
}

impl OptimisticMutator {
    pub fn new(cache: TtlCache, mutation_timeout: Duration, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            cache,
            mutation_timeout,
            metrics,
        }
    }

    /// 楽観的に更新してからリモートを呼び、結果に応じて確定またはロールバックする
    pub async fn mutate<U, F, Fut>(
        &self,
        target: Arc<dyn MutationTarget>,
        entity_id: &str,
        fields: FieldSet,
        local_update: U,
        remote_call: F,
    ) -> Result<ItemPatch, AppError>
    where
        U: Fn(&FeedItem) -> FeedItem + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<ItemPatch, AppError>> + Send,
    {
        let Some(pending) = target.begin(entity_id, &fields, &local_update).await else {
            return Err(AppError::conflict(format!(
                "Entity {entity_id} is not loaded locally"
            )));
        };
        debug!(entity_id, mutation_id = %pending.id, "optimistic update applied");

        let outcome = match timeout(self.mutation_timeout, remote_call()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!("mutation on {entity_id}"))),
        };

        match outcome {
            Ok(patch) => {
                let applied = target
                    .settle(&pending, Settlement::Commit(patch.clone()))
                    .await;
                if !applied {
                    debug!(entity_id, "entity gone before commit; skipping local apply");
                }
                for key in target.invalidation_keys() {
                    self.cache.remove(&key).await;
                }
                self.metrics.mutations.record_success();
                Ok(patch)
            }
            Err(err) => {
                warn!(entity_id, error = %err, "mutation failed; rolling back");
                target
                    .settle(&pending, Settlement::Rollback(pending.snapshot.clone()))
                    .await;
                self.metrics.mutations.record_failure();
                Err(err)
            }
        }
    }
}
