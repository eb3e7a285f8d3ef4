use super::status::{
    FeedConfig, FeedEvent, FeedPhase, LoadMoreOutcome, LoadOutcome, LoadSource, RefreshOutcome,
};
use crate::application::ports::remote_source::RemoteDataSource;
use crate::application::services::optimistic_mutator::{
    LocalUpdate, MutationTarget, PendingMutation, Settlement,
};
use crate::application::services::refresh_target::RefreshTarget;
use crate::domain::entities::sync::{FeedItem, FeedWindow};
use crate::domain::value_objects::sync::{
    CacheKey, EntityKind, FieldSet, IdentityScope, MutationId,
};
use crate::infrastructure::cache::TtlCache;
use crate::shared::error::AppError;
use crate::shared::metrics::SyncMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{RwLock, broadcast};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

struct FeedState {
    phase: FeedPhase,
    window: FeedWindow,
    /// 実行中ミューテーションが触れているフィールド（エンティティ id ごと）
    in_flight: HashMap<String, Vec<(MutationId, FieldSet)>>,
    /// 確定したフィールドとその確定番号（エンティティ id ごと）。
    /// 進行中の読み取りがある間だけ保持する。
    committed: HashMap<String, HashMap<String, u64>>,
    commit_seq: u64,
}

impl FeedState {
    /// 実行中のミューテーションと、読み取り開始 (`since`) より後に確定したミューテーションのフィールド
    fn protected_fields(&self, entity_id: &str, since: u64) -> Option<FieldSet> {
        let mut fields = FieldSet::new();
        if let Some(entries) = self.in_flight.get(entity_id) {
            for (_, touched) in entries {
                fields = fields.union(touched);
            }
        }
        if let Some(committed) = self.committed.get(entity_id) {
            for (name, seq) in committed {
                if *seq > since {
                    fields.insert(name.clone());
                }
            }
        }
        (!fields.is_empty()).then_some(fields)
    }

    /// リモートの値を取り込む前に、保護対象のフィールドをローカル値で上書きする
    fn preserve_local(&self, incoming: Vec<FeedItem>, since: u64) -> Vec<FeedItem> {
        if self.in_flight.is_empty() && self.committed.is_empty() {
            return incoming;
        }
        incoming
            .into_iter()
            .map(|item| self.preserve_item(item, since))
            .collect()
    }

    fn preserve_item(&self, item: FeedItem, since: u64) -> FeedItem {
        match (
            self.protected_fields(&item.id, since),
            self.window.get(&item.id),
        ) {
            (Some(fields), Some(local)) => item.preserving(local, &fields),
            _ => item,
        }
    }

    fn begin_read<'a>(&mut self, active_reads: &'a AtomicUsize) -> ReadTicket<'a> {
        if active_reads.fetch_add(1, Ordering::SeqCst) == 0 {
            self.committed.clear();
        }
        ReadTicket {
            active_reads,
            since: self.commit_seq,
        }
    }

    /// 確定したフィールドを、進行中の読み取りに上書きされないよう記録する
    fn record_commit(
        &mut self,
        entity_id: &str,
        fields: &FieldSet,
        active_reads: &AtomicUsize,
    ) {
        self.commit_seq += 1;
        if active_reads.load(Ordering::SeqCst) == 0 {
            return;
        }
        let seq = self.commit_seq;
        let committed = self.committed.entry(entity_id.to_string()).or_default();
        for name in fields.iter() {
            committed.insert(name.to_string(), seq);
        }
    }

    /// 読み取り開始後に確定したミューテーションがないか
    fn is_current(&self, ticket: &ReadTicket<'_>) -> bool {
        self.commit_seq == ticket.since
    }
}

/// リモート読み取りの開始時点の確定番号
struct ReadTicket<'a> {
    active_reads: &'a AtomicUsize,
    since: u64,
}

impl Drop for ReadTicket<'_> {
    fn drop(&mut self) {
        self.active_reads.fetch_sub(1, Ordering::SeqCst);
    }
}

/// ローカル由来の要素（キャッシュ・作成直後）には確定済みフィールドの保護を適用しない
const LOCAL_SOURCE: u64 = u64::MAX;

/// 1 種類のエンティティ（投稿・会話など）の表示ウィンドウを同期する
pub struct FeedSynchronizer {
    kind: EntityKind,
    cache_key: CacheKey,
    remote: Arc<dyn RemoteDataSource>,
    cache: TtlCache,
    config: FeedConfig,
    state: RwLock<FeedState>,
    loading_more: AtomicBool,
    active_reads: AtomicUsize,
    epoch: AtomicU64,
    alive: AtomicBool,
    events: broadcast::Sender<FeedEvent>,
    metrics: Arc<SyncMetrics>,
}

struct LoadMoreGuard<'a>(&'a AtomicBool);

impl Drop for LoadMoreGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FeedSynchronizer {
    pub fn new(
        kind: EntityKind,
        scope: &IdentityScope,
        remote: Arc<dyn RemoteDataSource>,
        cache: TtlCache,
        config: FeedConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            cache_key: CacheKey::scoped(&kind, scope),
            kind,
            remote,
            cache,
            config,
            state: RwLock::new(FeedState {
                phase: FeedPhase::Idle,
                window: FeedWindow::new(),
                in_flight: HashMap::new(),
                committed: HashMap::new(),
                commit_seq: 0,
            }),
            loading_more: AtomicBool::new(false),
            active_reads: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            events,
            metrics,
        })
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub async fn window(&self) -> FeedWindow {
        self.state.read().await.window.clone()
    }

    pub async fn phase(&self) -> FeedPhase {
        self.state.read().await.phase
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// 以降に届いた応答は状態に反映しない。実行中のミューテーションは止めない。
    pub fn detach(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(kind = %self.kind, "feed detached");
        }
    }

    /// キャッシュが新しければそれを表示して裏で更新し、なければ先頭ページを取得する
    pub async fn load(self: &Arc<Self>, force_refresh: bool) -> Result<LoadOutcome, AppError> {
        if !self.is_alive() {
            return Ok(self.discarded().await);
        }

        if !force_refresh
            && let Some(items) = self.cache.get::<Vec<FeedItem>>(&self.cache_key).await
        {
            let window = self.hydrate(items).await;
            debug!(kind = %self.kind, len = window.len(), "feed hydrated from cache");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.silent_refresh().await;
            });
            return Ok(LoadOutcome {
                source: LoadSource::Cache,
                window,
            });
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = {
            let mut state = self.state.write().await;
            state.phase = FeedPhase::Loading;
            state.begin_read(&self.active_reads)
        };

        match self.fetch_page(0).await {
            Ok(page) => {
                if !self.accepts(epoch) {
                    return Ok(self.discarded().await);
                }
                if self.state.read().await.is_current(&ticket) {
                    self.cache
                        .set(&self.cache_key, &page, self.config.cache_ttl)
                        .await;
                }
                let window = self.reset_window(page, ticket.since).await;
                info!(kind = %self.kind, len = window.len(), "feed loaded from remote");
                Ok(LoadOutcome {
                    source: LoadSource::Remote,
                    window,
                })
            }
            Err(err) if err.is_remote_failure() => {
                let stale = self.cache.get_stale::<Vec<FeedItem>>(&self.cache_key).await;
                match stale {
                    Some(items) if self.accepts(epoch) => {
                        warn!(kind = %self.kind, error = %err, "remote unavailable; showing stale cache");
                        let window = self.hydrate(items).await;
                        Ok(LoadOutcome {
                            source: LoadSource::StaleCache,
                            window,
                        })
                    }
                    _ => {
                        self.settle_failed_load().await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.settle_failed_load().await;
                Err(err)
            }
        }
    }

    /// 次ページを取得して末尾に追加する。読み込み中・末尾到達時は何もしない。
    pub async fn load_more(&self) -> Result<LoadMoreOutcome, AppError> {
        if !self.is_alive() {
            return Ok(LoadMoreOutcome::Skipped);
        }
        if self
            .loading_more
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(LoadMoreOutcome::Skipped);
        }
        let _guard = LoadMoreGuard(&self.loading_more);

        let epoch = self.epoch.load(Ordering::SeqCst);
        let offset = {
            let mut state = self.state.write().await;
            if !state.window.has_more() || state.phase == FeedPhase::Loading {
                return Ok(LoadMoreOutcome::Skipped);
            }
            state.phase = FeedPhase::LoadingMore;
            state.window.offset()
        };

        let result = self.fetch_page(offset).await;

        let mut state = self.state.write().await;
        if state.phase == FeedPhase::LoadingMore {
            state.phase = FeedPhase::Ready;
        }
        let page = result?;
        if !self.accepts(epoch) {
            debug!(kind = %self.kind, offset, "discarding stale page");
            return Ok(LoadMoreOutcome::Skipped);
        }

        let ids = state.window.append_page(page, self.config.page_size);
        let has_more = state.window.has_more();
        drop(state);

        debug!(kind = %self.kind, offset, added = ids.len(), has_more, "page appended");
        let added = ids.len();
        if !ids.is_empty() {
            self.emit(FeedEvent::Appended { ids });
        }
        Ok(LoadMoreOutcome::Appended { added, has_more })
    }

    /// 画面末尾が見えたときのフック
    pub async fn on_near_bottom(&self) -> Result<LoadMoreOutcome, AppError> {
        {
            let state = self.state.read().await;
            if !state.window.has_more() || state.phase != FeedPhase::Ready {
                return Ok(LoadMoreOutcome::Skipped);
            }
        }
        self.load_more().await
    }

    /// 先頭ページを取り直し、差分があるときだけ反映する。失敗は握りつぶす。
    pub async fn silent_refresh(&self) -> RefreshOutcome {
        if !self.is_alive() {
            return RefreshOutcome::Detached;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let ticket = {
            let mut state = self.state.write().await;
            match state.phase {
                FeedPhase::Ready => state.phase = FeedPhase::RefreshingSilently,
                FeedPhase::Idle | FeedPhase::Loading | FeedPhase::RefreshingSilently => {
                    return RefreshOutcome::Skipped;
                }
                FeedPhase::LoadingMore => {}
            }
            state.begin_read(&self.active_reads)
        };

        let result = self.fetch_page(0).await;

        let mut state = self.state.write().await;
        if state.phase == FeedPhase::RefreshingSilently {
            state.phase = FeedPhase::Ready;
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                debug!(kind = %self.kind, error = %err, "silent refresh failed");
                self.metrics.refreshes.record_failure();
                return RefreshOutcome::Failed;
            }
        };
        if !self.is_alive() {
            return RefreshOutcome::Detached;
        }
        if !self.accepts(epoch) {
            return RefreshOutcome::Skipped;
        }

        let merged = state.preserve_local(page.clone(), ticket.since);
        if state.window.head(self.config.page_size) == merged.as_slice() {
            self.metrics.record_refresh_unchanged();
            return RefreshOutcome::Unchanged;
        }

        let before = state.window.items().to_vec();
        state.window.replace_head(merged, self.config.page_size);
        let changed = FeedWindow::changed_ids(&before, state.window.items());
        let current = state.is_current(&ticket);
        drop(state);

        if current {
            self.cache
                .set(&self.cache_key, &page, self.config.cache_ttl)
                .await;
        }
        self.metrics.refreshes.record_success();
        debug!(kind = %self.kind, changed = changed.len(), "silent refresh applied");
        if !changed.is_empty() {
            self.emit(FeedEvent::ItemsChanged {
                ids: changed.clone(),
            });
        }
        RefreshOutcome::Applied { changed }
    }

    /// 1 件だけ取り直して、ウィンドウにあれば差し替える。
    /// サーバーに存在しなければウィンドウから外す。
    pub async fn refresh_entity(&self, entity_id: &str) -> bool {
        self.fetch_and_merge(entity_id, false).await
    }

    /// 作成済みの要素を先頭に入れる
    pub async fn prepend(&self, item: FeedItem) -> bool {
        if !self.is_alive() {
            return false;
        }
        let id = item.id.clone();
        let inserted = {
            let mut state = self.state.write().await;
            let item = state.preserve_item(item, LOCAL_SOURCE);
            state.window.prepend(item)
        };
        self.cache.remove(&self.cache_key).await;
        if inserted {
            self.emit(FeedEvent::Prepended { id });
        } else {
            self.emit(FeedEvent::ItemsChanged { ids: vec![id] });
        }
        inserted
    }

    async fn fetch_and_merge(&self, entity_id: &str, insert_missing: bool) -> bool {
        if !self.is_alive() {
            return false;
        }
        let ticket = {
            let mut state = self.state.write().await;
            if !insert_missing && !state.window.contains(entity_id) {
                return false;
            }
            state.begin_read(&self.active_reads)
        };

        let fetched = match timeout(
            self.config.refresh_timeout,
            self.remote.fetch_one(&self.kind, entity_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!("fetch {} {entity_id}", self.kind))),
        };

        if !self.is_alive() {
            return false;
        }

        match fetched {
            Ok(item) => {
                let mut state = self.state.write().await;
                let item = state.preserve_item(item, ticket.since);
                if state.window.get(entity_id) == Some(&item) {
                    return false;
                }
                if state.window.replace(item.clone()) {
                    drop(state);
                    self.emit(FeedEvent::ItemsChanged {
                        ids: vec![entity_id.to_string()],
                    });
                    true
                } else if insert_missing {
                    state.window.prepend(item);
                    drop(state);
                    self.emit(FeedEvent::Prepended {
                        id: entity_id.to_string(),
                    });
                    true
                } else {
                    false
                }
            }
            Err(AppError::NotFound(_)) => {
                let removed = self.state.write().await.window.remove(entity_id);
                if removed.is_some() {
                    debug!(kind = %self.kind, entity_id, "entity removed upstream");
                    self.emit(FeedEvent::Removed {
                        id: entity_id.to_string(),
                    });
                }
                removed.is_some()
            }
            Err(err) => {
                debug!(kind = %self.kind, entity_id, error = %err, "targeted refresh failed");
                false
            }
        }
    }

    async fn fetch_page(&self, offset: usize) -> Result<Vec<FeedItem>, AppError> {
        match timeout(
            self.config.refresh_timeout,
            self.remote
                .fetch_page(&self.kind, self.config.page_size, offset),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!(
                "fetch {} page at {offset}",
                self.kind
            ))),
        }
    }

    async fn hydrate(&self, items: Vec<FeedItem>) -> FeedWindow {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.reset_window(items, LOCAL_SOURCE).await
    }

    async fn reset_window(&self, items: Vec<FeedItem>, since: u64) -> FeedWindow {
        let window = {
            let mut state = self.state.write().await;
            let merged = state.preserve_local(items, since);
            state.window = FeedWindow::from_page(merged, self.config.page_size);
            state.phase = FeedPhase::Ready;
            state.window.clone()
        };
        self.emit(FeedEvent::Reset { len: window.len() });
        window
    }

    async fn settle_failed_load(&self) {
        let mut state = self.state.write().await;
        if state.phase == FeedPhase::Loading {
            state.phase = if state.window.is_empty() {
                FeedPhase::Idle
            } else {
                FeedPhase::Ready
            };
        }
    }

    async fn discarded(&self) -> LoadOutcome {
        LoadOutcome {
            source: LoadSource::Discarded,
            window: self.window().await,
        }
    }

    fn accepts(&self, epoch: u64) -> bool {
        self.is_alive() && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn emit(&self, event: FeedEvent) {
        // 購読者がいなくてもよい
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MutationTarget for FeedSynchronizer {
    async fn begin(
        &self,
        entity_id: &str,
        fields: &FieldSet,
        update: &LocalUpdate,
    ) -> Option<PendingMutation> {
        let pending = {
            let mut state = self.state.write().await;
            let snapshot = state.window.get(entity_id)?.clone();
            state.window.replace(update(&snapshot));
            let pending = PendingMutation {
                id: MutationId::generate(),
                entity_id: entity_id.to_string(),
                snapshot,
                fields: fields.clone(),
            };
            state
                .in_flight
                .entry(entity_id.to_string())
                .or_default()
                .push((pending.id.clone(), fields.clone()));
            pending
        };
        self.emit(FeedEvent::ItemsChanged {
            ids: vec![entity_id.to_string()],
        });
        Some(pending)
    }

    async fn settle(&self, pending: &PendingMutation, settlement: Settlement) -> bool {
        let applied = {
            let mut state = self.state.write().await;
            if let Some(entries) = state.in_flight.get_mut(&pending.entity_id) {
                entries.retain(|(id, _)| id != &pending.id);
                if entries.is_empty() {
                    state.in_flight.remove(&pending.entity_id);
                }
            }

            let current = state.window.get(&pending.entity_id).cloned();
            let next = match (current, settlement) {
                (Some(current), Settlement::Commit(patch)) => {
                    let fields = pending.fields.union(&patch.fields());
                    state.record_commit(&pending.entity_id, &fields, &self.active_reads);
                    Some(current.apply(&patch))
                }
                (Some(_), Settlement::Rollback(snapshot)) => Some(snapshot),
                (None, _) => None,
            };
            match next {
                Some(item) => state.window.replace(item),
                None => false,
            }
        };
        if applied {
            self.emit(FeedEvent::ItemsChanged {
                ids: vec![pending.entity_id.clone()],
            });
        }
        applied
    }

    fn invalidation_keys(&self) -> Vec<CacheKey> {
        vec![self.cache_key.clone()]
    }
}

#[async_trait]
impl RefreshTarget for FeedSynchronizer {
    fn entity_kind(&self) -> &EntityKind {
        &self.kind
    }

    async fn refresh_entity(&self, entity_id: &str) -> bool {
        FeedSynchronizer::refresh_entity(self, entity_id).await
    }

    async fn insert_entity(&self, entity_id: &str) -> bool {
        self.fetch_and_merge(entity_id, true).await
    }

    async fn refresh_all(&self) {
        self.silent_refresh().await;
    }
}
