use crate::domain::value_objects::sync::CacheKey;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// 永続化されるキャッシュエントリ。値はシリアライズ済み JSON。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: String,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: String, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            value,
            stored_at,
            ttl,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.stored_at
            .checked_add_signed(ttl_delta(self.ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `now - stored_at < ttl` の間だけ有効
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.stored_at) < ttl_delta(self.ttl)
    }
}

fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}
