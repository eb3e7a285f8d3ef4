use crate::application::ports::push_channel::{ChangeEvent, ChangeKind};
use crate::domain::value_objects::sync::EntityKind;
use async_trait::async_trait;

/// リアルタイム通知や復帰時チェックで再取得される同期対象
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    fn entity_kind(&self) -> &EntityKind;

    /// 1 件だけ再取得して差し替える。ローカル状態が変わったら `true`。
    async fn refresh_entity(&self, entity_id: &str) -> bool;

    /// 新規作成された 1 件を取得して先頭に入れる
    async fn insert_entity(&self, entity_id: &str) -> bool {
        self.refresh_entity(entity_id).await
    }

    /// 先頭ページを静かに取り直す
    async fn refresh_all(&self);

    /// 変更通知を対象 1 件の再取得に変換する
    async fn apply_change(&self, change: &ChangeEvent) -> bool {
        match change.change_kind {
            ChangeKind::Inserted => self.insert_entity(&change.entity_id).await,
            ChangeKind::Updated | ChangeKind::Deleted => {
                self.refresh_entity(&change.entity_id).await
            }
        }
    }
}
