use crate::application::ports::connection_checker::ConnectionChecker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorTier {
    Verified,
    /// 接続済みのユーザーにだけ見せる
    Member,
}

/// メンバー限定コンテンツの表示判定
pub struct ContentVisibilityPolicy {
    checker: Arc<dyn ConnectionChecker>,
    fail_open: bool,
}

impl ContentVisibilityPolicy {
    pub fn new(checker: Arc<dyn ConnectionChecker>, fail_open: bool) -> Self {
        Self { checker, fail_open }
    }

    pub fn fail_open(&self) -> bool {
        self.fail_open
    }

    pub async fn should_show(&self, viewer_id: &str, author_id: &str, tier: AuthorTier) -> bool {
        if viewer_id == author_id || tier == AuthorTier::Verified {
            return true;
        }

        match self.checker.is_connected(viewer_id, author_id).await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(
                    viewer_id,
                    author_id,
                    error = %err,
                    fail_open = self.fail_open,
                    "connection check failed"
                );
                self.fail_open
            }
        }
    }
}
