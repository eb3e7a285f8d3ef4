//! コミュニティクライアント（フィード・会話一覧・メンバー一覧）の同期エンジン

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{
    ChangeEvent, ChangeKind, Clock, ConnectionChecker, KeyValueStore, MutationAction, PushChannel,
    PushSignal, PushSubscription, RemoteDataSource, SessionRefresher,
};
pub use application::services::{
    AuthorTier, FeedEvent, FeedPhase, FeedSynchronizer, LoadMoreOutcome, LoadSource,
    RefreshOutcome, ReconcilerMode, ResumeDecision,
};
pub use domain::{ActionKey, CacheKey, EntityKind, FeedItem, FeedWindow, IdentityScope, ItemPatch};
pub use shared::{AppConfig, AppError, Result};
pub use state::{SessionManager, SyncDependencies, SyncSession};

/// ログ設定の初期化（既に初期化済みなら何もしない）
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "community_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
