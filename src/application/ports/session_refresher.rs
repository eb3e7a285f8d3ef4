use crate::shared::error::AppError;
use async_trait::async_trait;

/// セッション・トークンの再取得（認証基盤側の実装）
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh_session(&self) -> Result<(), AppError>;
}
