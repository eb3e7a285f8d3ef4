use super::entity_kind::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ミューテーションの論理的な識別子（例: `posts_like_42`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey(String);

impl ActionKey {
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("Action key cannot be empty".to_string());
        }
        Ok(Self(value))
    }

    /// 種別ごとに別のキーになる。投稿 42 と出品 42 へのいいねは合流しない。
    pub fn for_entity(kind: &EntityKind, action: &str, entity_id: &str) -> Self {
        Self(format!("{kind}_{action}_{entity_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
