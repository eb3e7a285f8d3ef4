use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ログイン中のユーザー。キャッシュとセッションの名前空間になる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityScope(String);

impl IdentityScope {
    pub fn new(user_id: impl Into<String>) -> Result<Self, AppError> {
        let value = user_id.into();
        if value.trim().is_empty() {
            return Err(AppError::NotAuthenticated);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IdentityScope> for String {
    fn from(value: IdentityScope) -> Self {
        value.0
    }
}
