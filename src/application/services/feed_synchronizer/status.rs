use crate::domain::entities::sync::FeedWindow;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedPhase {
    Idle,
    Loading,
    Ready,
    RefreshingSilently,
    LoadingMore,
}

/// 購読者に届く変更通知。変化がなければ何も送らない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FeedEvent {
    Reset { len: usize },
    Appended { ids: Vec<String> },
    Prepended { id: String },
    ItemsChanged { ids: Vec<String> },
    Removed { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Remote,
    /// リモートが使えず、期限切れのキャッシュで表示した
    StaleCache,
    /// 切り離し後、またはより新しいロードに追い越されて破棄した
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub window: FeedWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    Skipped,
    Appended { added: usize, has_more: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Unchanged,
    Applied { changed: Vec<String> },
    Failed,
    Detached,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub page_size: usize,
    pub cache_ttl: Duration,
    pub refresh_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            cache_ttl: Duration::from_secs(300),
            refresh_timeout: Duration::from_secs(5),
        }
    }
}
