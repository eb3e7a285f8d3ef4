use crate::domain::value_objects::sync::FieldSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const LIKE_COUNT: &str = "like_count";
pub const SHARE_COUNT: &str = "share_count";
pub const COMMENT_COUNT: &str = "comment_count";
pub const UNREAD_COUNT: &str = "unread_count";
pub const HAS_LIKED: &str = "has_liked";
pub const HAS_SHARED: &str = "has_shared";

/// 投稿・会話・出品などを一般化したフィード要素。同一性は `id` のみ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

/// サーバーが返す権威的なカウンター・フラグ、または部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl FeedItem {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            counters: BTreeMap::new(),
            flags: BTreeMap::new(),
            content: Value::Null,
            created_at,
        }
    }

    pub fn with_counter(mut self, name: &str, value: i64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.flags.insert(name.to_string(), value);
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// パッチを適用した新しい値を返す（自身は変更しない）
    pub fn apply(&self, patch: &ItemPatch) -> FeedItem {
        let mut next = self.clone();
        for (name, value) in &patch.counters {
            next.counters.insert(name.clone(), *value);
        }
        for (name, value) in &patch.flags {
            next.flags.insert(name.clone(), *value);
        }
        next
    }

    /// フラグを反転し、対応するカウンターを ±1 する（0 未満にはしない）
    pub fn toggled(&self, flag: &str, counter: &str) -> FeedItem {
        let now_set = !self.flag(flag);
        let current = self.counter(counter);
        let count = if now_set {
            current + 1
        } else {
            (current - 1).max(0)
        };
        self.apply(&ItemPatch::new().flag(flag, now_set).counter(counter, count))
    }

    /// `fields` に含まれる値だけ `local` 側を残す
    pub fn preserving(&self, local: &FeedItem, fields: &FieldSet) -> FeedItem {
        let mut merged = self.clone();
        for name in fields.iter() {
            match local.counters.get(name) {
                Some(value) => {
                    merged.counters.insert(name.to_string(), *value);
                }
                None => {
                    merged.counters.remove(name);
                }
            }
            match local.flags.get(name) {
                Some(value) => {
                    merged.flags.insert(name.to_string(), *value);
                }
                None => {
                    merged.flags.remove(name);
                }
            }
        }
        merged
    }
}

impl ItemPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(mut self, name: &str, value: i64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    pub fn flag(mut self, name: &str, value: bool) -> Self {
        self.flags.insert(name.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.flags.is_empty()
    }

    pub fn fields(&self) -> FieldSet {
        let mut fields = FieldSet::new();
        for name in self.counters.keys().chain(self.flags.keys()) {
            fields.insert(name.clone());
        }
        fields
    }
}
