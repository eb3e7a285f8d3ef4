use crate::application::ports::{
    Clock, ConnectionChecker, KeyValueStore, MutationAction, PushChannel, RemoteDataSource,
    SessionRefresher,
};
use crate::application::services::{
    ActionQueue, AuthorTier, ContentVisibilityPolicy, FeedConfig, FeedSynchronizer, LocalUpdate,
    MutationTarget, OptimisticMutator, RealtimeReconciler, ReconcilerHandle, ReconcilerMode,
    ResumeDecision, VisibilityMonitor,
};
use crate::domain::entities::sync::{
    FeedItem, HAS_LIKED, HAS_SHARED, ItemPatch, LIKE_COUNT, SHARE_COUNT, UNREAD_COUNT,
};
use crate::domain::value_objects::sync::{ActionKey, EntityKind, FieldSet, IdentityScope};
use crate::infrastructure::cache::TtlCache;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::SqliteKeyValueStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use crate::shared::metrics::{SyncMetrics, SyncMetricsSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info};

/// セッションが外部とやり取りするためのポート一式
#[derive(Clone)]
pub struct SyncDependencies {
    pub remote: Arc<dyn RemoteDataSource>,
    pub push: Arc<dyn PushChannel>,
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub clock: Arc<dyn Clock>,
    pub session_refresher: Option<Arc<dyn SessionRefresher>>,
    pub connection_checker: Option<Arc<dyn ConnectionChecker>>,
}

impl SyncDependencies {
    pub fn new(remote: Arc<dyn RemoteDataSource>, push: Arc<dyn PushChannel>) -> Self {
        Self {
            remote,
            push,
            store: None,
            clock: Arc::new(SystemClock),
            session_refresher: None,
            connection_checker: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.session_refresher = Some(refresher);
        self
    }

    pub fn with_connection_checker(mut self, checker: Arc<dyn ConnectionChecker>) -> Self {
        self.connection_checker = Some(checker);
        self
    }

    /// 設定に永続化先があれば SQLite ストアを開く
    pub async fn with_configured_store(self, config: &AppConfig) -> Result<Self, AppError> {
        match &config.cache.database_url {
            Some(url) => {
                let store = SqliteKeyValueStore::connect(url).await?;
                Ok(self.with_store(Arc::new(store)))
            }
            None => Ok(self),
        }
    }
}

/// ログイン中ユーザー 1 人分の同期コンテキスト
pub struct SyncSession {
    scope: IdentityScope,
    config: AppConfig,
    cache: TtlCache,
    actions: ActionQueue<ItemPatch>,
    mutator: OptimisticMutator,
    remote: Arc<dyn RemoteDataSource>,
    reconciler: RealtimeReconciler,
    visibility: Arc<VisibilityMonitor>,
    visibility_policy: Option<ContentVisibilityPolicy>,
    feeds: RwLock<HashMap<EntityKind, Arc<FeedSynchronizer>>>,
    subscriptions: Mutex<HashMap<EntityKind, ReconcilerHandle>>,
    metrics: Arc<SyncMetrics>,
}

impl SyncSession {
    pub fn new(scope: IdentityScope, config: AppConfig, deps: SyncDependencies) -> Arc<Self> {
        let metrics = Arc::new(SyncMetrics::new());
        let cache = match deps.store {
            Some(store) => TtlCache::new(
                store,
                Arc::clone(&deps.clock),
                config.cache.default_ttl(),
                config.cache.read_timeout(),
                Arc::clone(&metrics),
            ),
            None => TtlCache::disabled(Arc::clone(&deps.clock), Arc::clone(&metrics)),
        };
        let mutator = OptimisticMutator::new(
            cache.clone(),
            config.feed.mutation_timeout(),
            Arc::clone(&metrics),
        );
        let reconciler = RealtimeReconciler::new(
            deps.push,
            config.realtime.connect_timeout(),
            config.realtime.poll_interval(),
        );
        let visibility = VisibilityMonitor::new(
            deps.session_refresher,
            config.visibility.stale_after(),
            config.visibility.debounce(),
        );
        let visibility_policy = deps.connection_checker.map(|checker| {
            ContentVisibilityPolicy::new(checker, config.policy.fail_open_visibility)
        });

        Arc::new(Self {
            scope,
            cache,
            actions: ActionQueue::new(Arc::clone(&metrics)),
            mutator,
            remote: deps.remote,
            reconciler,
            visibility,
            visibility_policy,
            feeds: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            metrics,
            config,
        })
    }

    pub fn scope(&self) -> &IdentityScope {
        &self.scope
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn actions(&self) -> &ActionQueue<ItemPatch> {
        &self.actions
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 種別ごとの同期器を取得する（なければ作って復帰監視に登録する）
    pub async fn feed(&self, kind: &EntityKind) -> Arc<FeedSynchronizer> {
        if let Some(feed) = self.feeds.read().await.get(kind) {
            return Arc::clone(feed);
        }

        let feed = {
            let mut feeds = self.feeds.write().await;
            if let Some(feed) = feeds.get(kind) {
                return Arc::clone(feed);
            }
            let feed = FeedSynchronizer::new(
                kind.clone(),
                &self.scope,
                Arc::clone(&self.remote),
                self.cache.clone(),
                FeedConfig {
                    page_size: self.config.feed.page_size,
                    cache_ttl: self.config.cache.default_ttl(),
                    refresh_timeout: self.config.feed.refresh_timeout(),
                },
                Arc::clone(&self.metrics),
            );
            feeds.insert(kind.clone(), Arc::clone(&feed));
            feed
        };
        self.visibility.register(feed.clone()).await;
        debug!(kind = %kind, scope = %self.scope, "feed created");
        feed
    }

    /// 種別のリアルタイム購読を始める。既存の購読は置き換える。
    pub async fn subscribe_realtime(&self, kind: &EntityKind) -> watch::Receiver<ReconcilerMode> {
        let feed = self.feed(kind).await;
        let handle = self.reconciler.subscribe(feed);
        let modes = handle.mode_changes();
        let previous = self.subscriptions.lock().await.insert(kind.clone(), handle);
        if let Some(previous) = previous {
            previous.unsubscribe().await;
        }
        modes
    }

    pub async fn unsubscribe_realtime(&self, kind: &EntityKind) {
        let handle = self.subscriptions.lock().await.remove(kind);
        if let Some(handle) = handle {
            handle.unsubscribe().await;
        }
    }

    /// いいね・シェア・既読などのミューテーションを実行する。
    /// 同じ対象への同じ操作が実行中なら、その結果を共有する。
    pub async fn perform(
        &self,
        kind: &EntityKind,
        entity_id: &str,
        action: MutationAction,
    ) -> Result<ItemPatch, AppError> {
        let key = ActionKey::for_entity(kind, action.as_str(), entity_id);
        let target: Arc<dyn MutationTarget> = self.feed(kind).await;
        let (fields, update) = local_change(&action);
        let mutator = self.mutator.clone();
        let remote = Arc::clone(&self.remote);
        let kind = kind.clone();
        let entity_id = entity_id.to_string();
        let actor_id = self.scope.as_str().to_string();

        self.actions
            .execute(&key, move || async move {
                let remote_call = {
                    let remote = &remote;
                    let kind = &kind;
                    let entity_id = entity_id.as_str();
                    let action = &action;
                    let actor_id = actor_id.as_str();
                    move || async move { remote.mutate(kind, entity_id, action, actor_id).await }
                };
                mutator
                    .mutate(target, &entity_id, fields, update, remote_call)
                    .await
            })
            .await
    }

    /// 閲覧者（このセッションのユーザー）に作者のコンテンツを見せるか
    pub async fn should_show(&self, author_id: &str, tier: AuthorTier) -> bool {
        match &self.visibility_policy {
            Some(policy) => policy.should_show(self.scope.as_str(), author_id, tier).await,
            None => {
                tier == AuthorTier::Verified
                    || author_id == self.scope.as_str()
                    || self.config.policy.fail_open_visibility
            }
        }
    }

    pub async fn on_hidden(&self) {
        self.visibility.on_hidden().await;
    }

    pub async fn on_visible(&self) -> ResumeDecision {
        self.visibility.on_visible().await
    }

    /// 購読・実行中アクション・キャッシュを片付け、同期器を切り離す
    pub async fn teardown(&self) {
        let handles: Vec<ReconcilerHandle> = self
            .subscriptions
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            handle.unsubscribe().await;
        }

        self.actions.clear().await;
        let removed = self.cache.clear_scope(&self.scope).await;

        for (_, feed) in self.feeds.write().await.drain() {
            feed.detach();
        }
        self.visibility.clear_targets().await;
        info!(scope = %self.scope, removed, "session torn down");
    }
}

fn local_change(action: &MutationAction) -> (FieldSet, Box<LocalUpdate>) {
    match action {
        MutationAction::ToggleLike => (
            FieldSet::of(&[HAS_LIKED, LIKE_COUNT]),
            boxed(|item| item.toggled(HAS_LIKED, LIKE_COUNT)),
        ),
        MutationAction::ToggleShare => (
            FieldSet::of(&[HAS_SHARED, SHARE_COUNT]),
            boxed(|item| item.toggled(HAS_SHARED, SHARE_COUNT)),
        ),
        MutationAction::MarkRead => (
            FieldSet::of(&[UNREAD_COUNT]),
            boxed(|item| item.apply(&ItemPatch::new().counter(UNREAD_COUNT, 0))),
        ),
        MutationAction::Custom(_) => (FieldSet::new(), boxed(FeedItem::clone)),
    }
}

fn boxed(update: impl Fn(&FeedItem) -> FeedItem + Send + Sync + 'static) -> Box<LocalUpdate> {
    Box::new(update)
}

/// サインイン・サインアウトでセッションを入れ替える
pub struct SessionManager {
    config: AppConfig,
    deps: SyncDependencies,
    current: RwLock<Option<Arc<SyncSession>>>,
}

impl SessionManager {
    pub fn new(config: AppConfig, deps: SyncDependencies) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        Ok(Self {
            config,
            deps,
            current: RwLock::new(None),
        })
    }

    /// 設定の永続化先（SQLite）を開いてから構築する
    pub async fn from_config(config: AppConfig, deps: SyncDependencies) -> Result<Self, AppError> {
        let deps = deps.with_configured_store(&config).await?;
        Self::new(config, deps)
    }

    /// 以前のセッションの片付けから新しいセッションの設置までを 1 つの書き込みロックで行う
    pub async fn sign_in(&self, user_id: &str) -> Result<Arc<SyncSession>, AppError> {
        let scope = IdentityScope::new(user_id)?;
        let mut current = self.current.write().await;
        if let Some(previous) = current.take() {
            debug!(scope = %previous.scope(), "replacing active session");
            previous.teardown().await;
        }

        let session = SyncSession::new(scope, self.config.clone(), self.deps.clone());
        let expired = session.cache().cleanup_expired().await;
        info!(scope = %session.scope(), expired, "session started");
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        let session = self
            .current
            .write()
            .await
            .take()
            .ok_or(AppError::NotAuthenticated)?;
        session.teardown().await;
        Ok(())
    }

    pub async fn current(&self) -> Result<Arc<SyncSession>, AppError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(AppError::NotAuthenticated)
    }
}
