use super::{EntityKind, IdentityScope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `<kind>_<userId>` 形式のキャッシュキー。所有者のスコープを保持する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    value: String,
    scope: IdentityScope,
}

impl CacheKey {
    pub fn scoped(kind: &EntityKind, scope: &IdentityScope) -> Self {
        Self::named(kind.as_str(), scope)
    }

    pub fn named(name: &str, scope: &IdentityScope) -> Self {
        Self {
            value: format!("{name}_{}", scope.as_str()),
            scope: scope.clone(),
        }
    }

    /// 永続化済みの値から復元する
    pub fn from_stored(value: String, scope: IdentityScope) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("Cache key cannot be empty".to_string());
        }
        Ok(Self { value, scope })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn scope(&self) -> &IdentityScope {
        &self.scope
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
