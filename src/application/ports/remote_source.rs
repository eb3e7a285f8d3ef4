use crate::domain::entities::sync::{FeedItem, ItemPatch};
use crate::domain::value_objects::sync::EntityKind;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationAction {
    ToggleLike,
    ToggleShare,
    MarkRead,
    Custom(String),
}

impl MutationAction {
    pub fn as_str(&self) -> &str {
        match self {
            MutationAction::ToggleLike => "like",
            MutationAction::ToggleShare => "share",
            MutationAction::MarkRead => "read",
            MutationAction::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// バックエンドの手続き群（`get_home_feed`, `toggle_post_like` など）への窓口
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// 最大 `limit` 件。`limit` 未満なら末尾に到達している。
    async fn fetch_page(
        &self,
        kind: &EntityKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FeedItem>, AppError>;

    async fn fetch_one(&self, kind: &EntityKind, id: &str) -> Result<FeedItem, AppError>;

    /// サーバー側で確定したカウンター・フラグを返す
    async fn mutate(
        &self,
        kind: &EntityKind,
        id: &str,
        action: &MutationAction,
        actor_id: &str,
    ) -> Result<ItemPatch, AppError>;
}
