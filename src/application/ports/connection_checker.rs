use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait ConnectionChecker: Send + Sync {
    async fn is_connected(&self, viewer_id: &str, author_id: &str) -> Result<bool, AppError>;
}
