use crate::domain::value_objects::sync::ActionKey;
use crate::shared::error::AppError;
use crate::shared::metrics::SyncMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, AppError>>>;

struct PendingAction<T> {
    generation: u64,
    outcome: SharedOutcome<T>,
}

/// キー単位でアクションを 1 本にまとめるキュー。
///
/// 同じキーで実行中のアクションがあれば新たに起動せず、その結果を共有する。
/// アクションはランタイム上で実行されるため、呼び出し側が全員 drop しても完了する。
pub struct ActionQueue<T> {
    pending: Arc<Mutex<HashMap<String, PendingAction<T>>>>,
    next_generation: AtomicU64,
    metrics: Arc<SyncMetrics>,
}

impl<T> ActionQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(metrics: Arc<SyncMetrics>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            metrics,
        }
    }

    /// 実行中のアクションがあれば合流し、なければ `action` を起動する
    pub async fn execute<F, Fut>(&self, key: &ActionKey, action: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let outcome = {
            let mut pending = self.pending.lock().await;
            match pending.get(key.as_str()) {
                Some(existing) => {
                    debug!(key = %key, "joining pending action");
                    self.metrics.record_action_join();
                    existing.outcome.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let outcome = self.spawn(key.as_str().to_string(), generation, action());
                    pending.insert(
                        key.as_str().to_string(),
                        PendingAction {
                            generation,
                            outcome: outcome.clone(),
                        },
                    );
                    outcome
                }
            }
        };

        outcome.await
    }

    pub async fn is_pending(&self, key: &ActionKey) -> bool {
        self.pending.lock().await.contains_key(key.as_str())
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// 登録をすべて破棄する。実行中のアクション自体は完了まで走る。
    pub async fn clear(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            debug!(count = pending.len(), "clearing pending actions");
        }
        pending.clear();
    }

    fn spawn<Fut>(&self, key: String, generation: u64, work: Fut) -> SharedOutcome<T>
    where
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let registry = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            let result = work.await;
            // 登録し直された新しい世代は消さない
            let mut pending = registry.lock().await;
            if pending
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                pending.remove(&key);
            }
            result
        });

        async move { handle.await.map_err(AppError::from).and_then(|result| result) }
            .boxed()
            .shared()
    }
}
