use async_trait::async_trait;
use community_sync::domain::entities::sync::{HAS_LIKED, HAS_SHARED, LIKE_COUNT, SHARE_COUNT};
use community_sync::{AppError, EntityKind, FeedItem, ItemPatch, MutationAction, RemoteDataSource};
use mockall::mock;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteDataSource for Remote {
        async fn fetch_page(
            &self,
            kind: &EntityKind,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<FeedItem>, AppError>;
        async fn fetch_one(&self, kind: &EntityKind, id: &str) -> Result<FeedItem, AppError>;
        async fn mutate(
            &self,
            kind: &EntityKind,
            id: &str,
            action: &MutationAction,
            actor_id: &str,
        ) -> Result<ItemPatch, AppError>;
    }
}

/// サーバー側の状態を持つ疑似バックエンド
#[derive(Default)]
pub struct InMemoryRemote {
    items: Mutex<HashMap<EntityKind, Vec<FeedItem>>>,
    page_calls: AtomicUsize,
    fetch_one_calls: AtomicUsize,
    mutate_calls: AtomicUsize,
    mutate_delay: Mutex<Option<Duration>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, kind: EntityKind, items: Vec<FeedItem>) {
        self.items.lock().unwrap().insert(kind, items);
    }

    pub fn set_mutate_delay(&self, delay: Duration) {
        *self.mutate_delay.lock().unwrap() = Some(delay);
    }

    pub fn update(&self, kind: &EntityKind, id: &str, f: impl FnOnce(&FeedItem) -> FeedItem) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items
            .get_mut(kind)
            .and_then(|items| items.iter_mut().find(|item| item.id == id))
        {
            *item = f(item);
        }
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }

    pub fn mutate_calls(&self) -> usize {
        self.mutate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteDataSource for InMemoryRemote {
    async fn fetch_page(
        &self,
        kind: &EntityKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FeedItem>, AppError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        Ok(items
            .get(kind)
            .map(|items| items.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_one(&self, kind: &EntityKind, id: &str) -> Result<FeedItem, AppError> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        items
            .get(kind)
            .and_then(|items| items.iter().find(|item| item.id == id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{kind} {id}")))
    }

    async fn mutate(
        &self,
        kind: &EntityKind,
        id: &str,
        action: &MutationAction,
        _actor_id: &str,
    ) -> Result<ItemPatch, AppError> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.mutate_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(kind)
            .and_then(|items| items.iter_mut().find(|item| item.id == id))
            .ok_or_else(|| AppError::NotFound(format!("{kind} {id}")))?;
        let (flag, counter) = match action {
            MutationAction::ToggleLike => (HAS_LIKED, LIKE_COUNT),
            MutationAction::ToggleShare => (HAS_SHARED, SHARE_COUNT),
            _ => return Ok(ItemPatch::new()),
        };
        *item = item.toggled(flag, counter);
        Ok(ItemPatch::new()
            .flag(flag, item.flag(flag))
            .counter(counter, item.counter(counter)))
    }
}
