use crate::application::ports::session_refresher::SessionRefresher;
use crate::application::services::refresh_target::RefreshTarget;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// 非表示の記録がない
    NotHidden,
    TooSoon { away: Duration },
    /// 直前の確認から間がない
    Debounced,
    Triggered { away: Duration },
}

/// アプリがバックグラウンドから戻ったときの鮮度確認
pub struct VisibilityMonitor {
    targets: Mutex<Vec<Arc<dyn RefreshTarget>>>,
    session: Option<Arc<dyn SessionRefresher>>,
    stale_after: Duration,
    debounce: Duration,
    hidden_at: Mutex<Option<Instant>>,
    last_check: Mutex<Option<Instant>>,
}

impl VisibilityMonitor {
    pub fn new(
        session: Option<Arc<dyn SessionRefresher>>,
        stale_after: Duration,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            targets: Mutex::new(Vec::new()),
            session,
            stale_after,
            debounce,
            hidden_at: Mutex::new(None),
            last_check: Mutex::new(None),
        })
    }

    pub async fn register(&self, target: Arc<dyn RefreshTarget>) {
        self.targets.lock().await.push(target);
    }

    pub async fn clear_targets(&self) {
        self.targets.lock().await.clear();
    }

    pub async fn target_count(&self) -> usize {
        self.targets.lock().await.len()
    }

    pub async fn on_hidden(&self) {
        let mut hidden_at = self.hidden_at.lock().await;
        if hidden_at.is_none() {
            *hidden_at = Some(Instant::now());
        }
    }

    /// 非表示だった時間がしきい値を超えていれば、鮮度確認をバックグラウンドで始める
    pub async fn on_visible(self: &Arc<Self>) -> ResumeDecision {
        let Some(hidden_at) = self.hidden_at.lock().await.take() else {
            return ResumeDecision::NotHidden;
        };
        let now = Instant::now();
        let away = now.duration_since(hidden_at);
        if away <= self.stale_after {
            debug!(away_ms = away.as_millis() as u64, "resume within freshness window");
            return ResumeDecision::TooSoon { away };
        }

        {
            let mut last_check = self.last_check.lock().await;
            if let Some(last) = *last_check
                && now.duration_since(last) < self.debounce
            {
                return ResumeDecision::Debounced;
            }
            *last_check = Some(now);
        }

        info!(away_ms = away.as_millis() as u64, "resumed after background; checking freshness");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_freshness_check().await;
        });
        ResumeDecision::Triggered { away }
    }

    /// セッションを更新してから、登録済みの全対象を静かに取り直す
    pub async fn run_freshness_check(&self) {
        if let Some(session) = &self.session
            && let Err(err) = session.refresh_session().await
        {
            warn!(error = %err, "session refresh failed on resume");
        }

        let targets = self.targets.lock().await.clone();
        join_all(targets.iter().map(|target| target.refresh_all())).await;
    }
}
