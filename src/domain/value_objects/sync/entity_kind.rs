use serde::{Deserialize, Serialize};
use std::fmt;

/// 同期対象のデータ種別。キャッシュキーとリモート呼び出しの判別に使う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EntityKind {
    Post,
    Conversation,
    Member,
    Listing,
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Post => "posts",
            EntityKind::Conversation => "conversations",
            EntityKind::Member => "members",
            EntityKind::Listing => "listings",
            EntityKind::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntityKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "posts" => EntityKind::Post,
            "conversations" => EntityKind::Conversation,
            "members" => EntityKind::Member,
            "listings" => EntityKind::Listing,
            _ => EntityKind::Other(value),
        }
    }
}

impl From<EntityKind> for String {
    fn from(value: EntityKind) -> Self {
        match value {
            EntityKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}
