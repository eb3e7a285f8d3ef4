use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    /// 識別コンテキストがない（サインアウト中など）
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    /// エンティティが消えた、または互換性のない変更が入った
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Malformed cache entry: {0}")]
    MalformedCache(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn timeout(operation: impl Into<String>) -> Self {
        AppError::Timeout(operation.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// ネットワーク起因の失敗か（読み取りは古いキャッシュで継続できる）
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, AppError::RemoteUnavailable(_) | AppError::Timeout(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
