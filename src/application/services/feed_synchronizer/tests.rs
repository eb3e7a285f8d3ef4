use super::*;
use crate::application::ports::push_channel::{ChangeEvent, ChangeKind};
use crate::application::ports::remote_source::{MutationAction, RemoteDataSource};
use crate::application::services::optimistic_mutator::{MutationTarget, Settlement};
use crate::application::services::refresh_target::RefreshTarget;
use crate::domain::entities::sync::{COMMENT_COUNT, FeedItem, HAS_LIKED, ItemPatch, LIKE_COUNT};
use crate::domain::value_objects::sync::{EntityKind, FieldSet, IdentityScope};
use crate::infrastructure::cache::{MemoryKeyValueStore, TtlCache};
use crate::infrastructure::clock::ManualClock;
use crate::shared::error::AppError;
use crate::shared::metrics::SyncMetrics;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

struct FakeRemote {
    items: Mutex<Vec<FeedItem>>,
    page_offsets: Mutex<Vec<usize>>,
    failing: AtomicBool,
    page_delay: Mutex<Option<Duration>>,
}

impl FakeRemote {
    fn with_posts(count: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new((0..count).map(|index| post(&format!("p{index}"), index)).collect()),
            page_offsets: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            page_delay: Mutex::new(None),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_page_delay(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }

    fn page_offsets(&self) -> Vec<usize> {
        self.page_offsets.lock().unwrap().clone()
    }

    fn update(&self, id: &str, f: impl FnOnce(&FeedItem) -> FeedItem) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            *item = f(item);
        }
    }

    fn remove(&self, id: &str) {
        self.items.lock().unwrap().retain(|item| item.id != id);
    }

    fn push_front(&self, item: FeedItem) {
        self.items.lock().unwrap().insert(0, item);
    }
}

#[async_trait]
impl RemoteDataSource for FakeRemote {
    async fn fetch_page(
        &self,
        _kind: &EntityKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FeedItem>, AppError> {
        self.page_offsets.lock().unwrap().push(offset);
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::RemoteUnavailable("offline".to_string()));
        }
        let items = self.items.lock().unwrap();
        Ok(items.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn fetch_one(&self, _kind: &EntityKind, id: &str) -> Result<FeedItem, AppError> {
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::RemoteUnavailable("offline".to_string()));
        }
        let items = self.items.lock().unwrap();
        items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn mutate(
        &self,
        _kind: &EntityKind,
        _id: &str,
        _action: &MutationAction,
        _actor_id: &str,
    ) -> Result<ItemPatch, AppError> {
        Ok(ItemPatch::new())
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

fn post(id: &str, age_minutes: usize) -> FeedItem {
    FeedItem::new(id, base_time() - TimeDelta::minutes(age_minutes as i64))
        .with_counter(LIKE_COUNT, 0)
        .with_flag(HAS_LIKED, false)
}

struct Harness {
    feed: Arc<FeedSynchronizer>,
    cache: TtlCache,
    clock: Arc<ManualClock>,
    metrics: Arc<SyncMetrics>,
}

fn harness(remote: Arc<FakeRemote>) -> Harness {
    let clock = Arc::new(ManualClock::new(base_time()));
    let metrics = Arc::new(SyncMetrics::new());
    let cache = TtlCache::new(
        Arc::new(MemoryKeyValueStore::new()),
        clock.clone(),
        Duration::from_secs(300),
        Duration::from_millis(500),
        metrics.clone(),
    );
    let feed = FeedSynchronizer::new(
        EntityKind::Post,
        &IdentityScope::new("u1").unwrap(),
        remote,
        cache.clone(),
        FeedConfig::default(),
        metrics.clone(),
    );
    Harness {
        feed,
        cache,
        clock,
        metrics,
    }
}

fn ids(window: &crate::domain::entities::sync::FeedWindow) -> Vec<String> {
    window.ids()
}

#[tokio::test]
async fn test_cold_start_then_load_more_reaches_end() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote.clone());

    let outcome = h.feed.load(false).await.unwrap();
    assert_eq!(outcome.source, LoadSource::Remote);
    assert_eq!(outcome.window.len(), 10);
    assert!(outcome.window.has_more());

    let more = h.feed.load_more().await.unwrap();
    assert_eq!(
        more,
        LoadMoreOutcome::Appended {
            added: 5,
            has_more: false
        }
    );

    let again = h.feed.load_more().await.unwrap();
    assert_eq!(again, LoadMoreOutcome::Skipped);

    let window = h.feed.window().await;
    assert_eq!(window.len(), 15);
    assert_eq!(window.items()[14].id, "p14");
    assert_eq!(remote.page_offsets(), vec![0, 10]);
    assert_eq!(h.feed.phase().await, FeedPhase::Ready);
}

#[tokio::test]
async fn test_load_stores_first_page_in_cache() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote);

    h.feed.load(false).await.unwrap();

    let cached: Option<Vec<FeedItem>> = h.cache.get(h.feed.cache_key()).await;
    assert_eq!(cached.map(|items| items.len()), Some(10));
}

#[tokio::test]
async fn test_cache_hit_hydrates_then_refreshes_in_background() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    let cached: Vec<FeedItem> = (0..3).map(|index| post(&format!("p{index}"), index)).collect();
    h.cache.set_default(h.feed.cache_key(), &cached).await;
    remote.update("p1", |item| item.clone().with_counter(LIKE_COUNT, 9));
    let mut events = h.feed.subscribe();

    let outcome = h.feed.load(false).await.unwrap();

    assert_eq!(outcome.source, LoadSource::Cache);
    assert_eq!(outcome.window.get("p1").unwrap().counter(LIKE_COUNT), 0);
    assert_eq!(events.recv().await.unwrap(), FeedEvent::Reset { len: 3 });

    let changed = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        changed,
        FeedEvent::ItemsChanged {
            ids: vec!["p1".to_string()]
        }
    );
    let window = h.feed.window().await;
    assert_eq!(window.get("p1").unwrap().counter(LIKE_COUNT), 9);
}

#[tokio::test]
async fn test_force_refresh_bypasses_cache() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.cache
        .set_default(h.feed.cache_key(), &vec![post("old", 99)])
        .await;

    let outcome = h.feed.load(true).await.unwrap();

    assert_eq!(outcome.source, LoadSource::Remote);
    assert_eq!(ids(&outcome.window), vec!["p0", "p1", "p2"]);
    assert!(!outcome.window.has_more());
}

#[tokio::test]
async fn test_unchanged_refresh_emits_nothing() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote);
    h.feed.load(false).await.unwrap();
    let mut events = h.feed.subscribe();

    let outcome = h.feed.silent_refresh().await;

    assert_eq!(outcome, RefreshOutcome::Unchanged);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.metrics.snapshot().refresh_unchanged, 1);
}

#[tokio::test]
async fn test_refresh_failure_is_swallowed() {
    let remote = FakeRemote::with_posts(5);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();
    let before = h.feed.window().await;

    remote.set_failing(true);
    let outcome = h.feed.silent_refresh().await;

    assert_eq!(outcome, RefreshOutcome::Failed);
    assert_eq!(h.feed.window().await, before);
    assert_eq!(h.feed.phase().await, FeedPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_load_more_is_idempotent_while_pending() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();
    remote.set_page_delay(Duration::from_secs(1));

    let (first, second) = tokio::join!(h.feed.load_more(), h.feed.load_more());

    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&LoadMoreOutcome::Skipped));
    assert!(outcomes.contains(&LoadMoreOutcome::Appended {
        added: 5,
        has_more: false
    }));
    assert_eq!(remote.page_offsets(), vec![0, 10]);
}

#[tokio::test]
async fn test_load_more_deduplicates_shifted_page() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    // 新着が 1 件入り、次ページの先頭が既に表示済みの p9 になる
    remote.push_front(post("fresh", 0));
    let outcome = h.feed.load_more().await.unwrap();

    assert_eq!(
        outcome,
        LoadMoreOutcome::Appended {
            added: 5,
            has_more: false
        }
    );
    let window = h.feed.window().await;
    assert_eq!(window.len(), 15);
    assert_eq!(window.items()[9].id, "p9");
    assert_eq!(window.items()[10].id, "p10");
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_stale_cache() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.cache
        .set(
            h.feed.cache_key(),
            &vec![post("p0", 0)],
            Duration::from_secs(60),
        )
        .await;
    h.clock.advance(Duration::from_secs(120));
    remote.set_failing(true);

    let outcome = h.feed.load(false).await.unwrap();

    assert_eq!(outcome.source, LoadSource::StaleCache);
    assert_eq!(ids(&outcome.window), vec!["p0"]);
}

#[tokio::test]
async fn test_remote_failure_without_cache_surfaces() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    remote.set_failing(true);

    let result = h.feed.load(false).await;

    assert!(matches!(result, Err(AppError::RemoteUnavailable(_))));
    assert_eq!(h.feed.phase().await, FeedPhase::Idle);
}

#[tokio::test]
async fn test_refresh_keeps_fields_of_in_flight_mutation() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    let like = |item: &FeedItem| item.toggled(HAS_LIKED, LIKE_COUNT);
    let pending = h
        .feed
        .begin("p1", &FieldSet::of(&[HAS_LIKED, LIKE_COUNT]), &like)
        .await
        .unwrap();
    remote.update("p1", |item| item.clone().with_counter(COMMENT_COUNT, 5));

    let outcome = h.feed.silent_refresh().await;
    assert_eq!(
        outcome,
        RefreshOutcome::Applied {
            changed: vec!["p1".to_string()]
        }
    );
    let during = h.feed.window().await.get("p1").cloned().unwrap();
    assert!(during.flag(HAS_LIKED));
    assert_eq!(during.counter(LIKE_COUNT), 1);
    assert_eq!(during.counter(COMMENT_COUNT), 5);

    let settled = h
        .feed
        .settle(
            &pending,
            Settlement::Commit(ItemPatch::new().flag(HAS_LIKED, true).counter(LIKE_COUNT, 7)),
        )
        .await;
    assert!(settled);
    let after = h.feed.window().await.get("p1").cloned().unwrap();
    assert_eq!(after.counter(LIKE_COUNT), 7);
    assert_eq!(after.counter(COMMENT_COUNT), 5);
}

#[tokio::test]
async fn test_begin_on_missing_entity_returns_none() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote);
    h.feed.load(false).await.unwrap();

    let like = |item: &FeedItem| item.toggled(HAS_LIKED, LIKE_COUNT);
    assert!(h.feed.begin("nope", &FieldSet::new(), &like).await.is_none());
}

#[tokio::test]
async fn test_detached_feed_ignores_late_work() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    h.feed.detach();

    assert!(!h.feed.is_alive());
    assert_eq!(h.feed.load_more().await.unwrap(), LoadMoreOutcome::Skipped);
    assert_eq!(h.feed.silent_refresh().await, RefreshOutcome::Detached);
    assert!(!h.feed.refresh_entity("p1").await);
    assert_eq!(remote.page_offsets(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_detach_during_load_more_discards_page() {
    let remote = FakeRemote::with_posts(15);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();
    remote.set_page_delay(Duration::from_secs(1));

    let feed = h.feed.clone();
    let pending = tokio::spawn(async move { feed.load_more().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.feed.detach();

    assert_eq!(pending.await.unwrap().unwrap(), LoadMoreOutcome::Skipped);
    assert_eq!(h.feed.window().await.len(), 10);
}

#[tokio::test]
async fn test_refresh_entity_replaces_in_place_and_drops_deleted() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();
    let mut events = h.feed.subscribe();

    remote.update("p2", |item| item.clone().with_counter(LIKE_COUNT, 4));
    assert!(h.feed.refresh_entity("p2").await);
    assert_eq!(
        events.recv().await.unwrap(),
        FeedEvent::ItemsChanged {
            ids: vec!["p2".to_string()]
        }
    );
    assert_eq!(ids(&h.feed.window().await), vec!["p0", "p1", "p2"]);

    remote.remove("p2");
    let deleted = ChangeEvent {
        entity_id: "p2".to_string(),
        change_kind: ChangeKind::Deleted,
    };
    assert!(h.feed.apply_change(&deleted).await);
    assert_eq!(
        events.recv().await.unwrap(),
        FeedEvent::Removed {
            id: "p2".to_string()
        }
    );
    assert_eq!(ids(&h.feed.window().await), vec!["p0", "p1"]);
}

#[tokio::test]
async fn test_inserted_change_prepends_new_item() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    remote.push_front(post("fresh", 0));
    let inserted = ChangeEvent {
        entity_id: "fresh".to_string(),
        change_kind: ChangeKind::Inserted,
    };

    assert!(h.feed.apply_change(&inserted).await);
    assert_eq!(ids(&h.feed.window().await), vec!["fresh", "p0", "p1", "p2"]);
    // 2 回目は変化なし
    assert!(!h.feed.apply_change(&inserted).await);
}

#[tokio::test]
async fn test_prepend_created_item_invalidates_cache() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote);
    h.feed.load(false).await.unwrap();

    assert!(h.feed.prepend(post("mine", 0)).await);
    assert!(!h.feed.prepend(post("mine", 0)).await);

    assert_eq!(h.feed.window().await.len(), 4);
    let cached: Option<Vec<FeedItem>> = h.cache.get(h.feed.cache_key()).await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_on_near_bottom_only_loads_when_more_exists() {
    let remote = FakeRemote::with_posts(4);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    assert_eq!(
        h.feed.on_near_bottom().await.unwrap(),
        LoadMoreOutcome::Skipped
    );
    assert_eq!(remote.page_offsets(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_started_before_commit_keeps_committed_fields() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    let like = |item: &FeedItem| item.toggled(HAS_LIKED, LIKE_COUNT);
    let pending = h
        .feed
        .begin("p1", &FieldSet::of(&[HAS_LIKED, LIKE_COUNT]), &like)
        .await
        .unwrap();
    remote.set_page_delay(Duration::from_millis(100));
    let feed = h.feed.clone();
    let refresh = tokio::spawn(async move { feed.silent_refresh().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let settled = h
        .feed
        .settle(
            &pending,
            Settlement::Commit(ItemPatch::new().flag(HAS_LIKED, true).counter(LIKE_COUNT, 7)),
        )
        .await;
    assert!(settled);

    // 確定前の値を返した読み取りは確定結果を上書きしない
    assert_eq!(refresh.await.unwrap(), RefreshOutcome::Unchanged);
    let after = h.feed.window().await.get("p1").cloned().unwrap();
    assert!(after.flag(HAS_LIKED));
    assert_eq!(after.counter(LIKE_COUNT), 7);

    remote.update("p1", |item| {
        item.clone().with_flag(HAS_LIKED, true).with_counter(LIKE_COUNT, 8)
    });
    assert_eq!(
        h.feed.silent_refresh().await,
        RefreshOutcome::Applied {
            changed: vec!["p1".to_string()]
        }
    );
    assert_eq!(h.feed.window().await.get("p1").unwrap().counter(LIKE_COUNT), 8);
}

#[tokio::test(start_paused = true)]
async fn test_entity_refresh_started_before_commit_keeps_committed_fields() {
    let remote = FakeRemote::with_posts(3);
    let h = harness(remote.clone());
    h.feed.load(false).await.unwrap();

    let like = |item: &FeedItem| item.toggled(HAS_LIKED, LIKE_COUNT);
    let pending = h
        .feed
        .begin("p1", &FieldSet::of(&[HAS_LIKED, LIKE_COUNT]), &like)
        .await
        .unwrap();
    remote.update("p1", |item| item.clone().with_counter(COMMENT_COUNT, 4));
    remote.set_page_delay(Duration::from_millis(100));
    let feed = h.feed.clone();
    let refresh = tokio::spawn(async move { feed.refresh_entity("p1").await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.feed
        .settle(
            &pending,
            Settlement::Commit(ItemPatch::new().flag(HAS_LIKED, true).counter(LIKE_COUNT, 7)),
        )
        .await;
    assert!(refresh.await.unwrap());

    let after = h.feed.window().await.get("p1").cloned().unwrap();
    assert!(after.flag(HAS_LIKED));
    assert_eq!(after.counter(LIKE_COUNT), 7);
    assert_eq!(after.counter(COMMENT_COUNT), 4);
}

#[tokio::test]
async fn test_new_head_item_keeps_pushed_down_item_in_window() {
    let remote = FakeRemote::with_posts(25);
    let h = harness(remote.clone());
    h.feed.load(true).await.unwrap();
    h.feed.load_more().await.unwrap();

    remote.push_front(post("new", 0));
    let outcome = h.feed.silent_refresh().await;
    assert!(matches!(outcome, RefreshOutcome::Applied { .. }));

    let window = h.feed.window().await;
    assert_eq!(window.len(), 21);
    assert_eq!(window.items()[0].id, "new");
    assert_eq!(window.items()[10].id, "p9");

    assert_eq!(
        h.feed.load_more().await.unwrap(),
        LoadMoreOutcome::Appended {
            added: 5,
            has_more: false
        }
    );
    let window = h.feed.window().await;
    assert_eq!(window.len(), 26);
    assert!(window.contains("p9"));
    assert_eq!(remote.page_offsets(), vec![0, 10, 0, 21]);
}
