use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub feed: FeedSyncConfig,
    pub realtime: RealtimeConfig,
    pub visibility: VisibilityConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// None の場合は永続化なし（常にキャッシュミス）
    pub database_url: Option<String>,
    pub default_ttl_secs: u64,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSyncConfig {
    pub page_size: usize,
    pub refresh_timeout_ms: u64,
    pub mutation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityConfig {
    pub stale_after_secs: u64,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// 接続状態の確認に失敗した場合にメンバー限定コンテンツを表示するか
    pub fail_open_visibility: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                database_url: Some("sqlite://./data/community_sync.db?mode=rwc".to_string()),
                default_ttl_secs: 300, // 5 minutes
                read_timeout_ms: 500,
            },
            feed: FeedSyncConfig {
                page_size: 10,
                refresh_timeout_ms: 5_000,
                mutation_timeout_ms: 15_000,
            },
            realtime: RealtimeConfig {
                connect_timeout_ms: 3_000,
                poll_interval_ms: 15_000,
            },
            visibility: VisibilityConfig {
                stale_after_secs: 30,
                debounce_ms: 1_000,
            },
            policy: PolicyConfig {
                fail_open_visibility: true,
            },
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl FeedSyncConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}

impl RealtimeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl VisibilityConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COMMUNITY_SYNC_CACHE_URL") {
            let trimmed = v.trim();
            cfg.cache.database_url = if trimmed.is_empty() || trimmed == "none" {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_CACHE_TTL_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.cache.default_ttl_secs = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_CACHE_READ_TIMEOUT_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.cache.read_timeout_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_PAGE_SIZE")
            && let Some(value) = parse_u64(&v)
        {
            cfg.feed.page_size = value as usize;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_REFRESH_TIMEOUT_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.feed.refresh_timeout_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_MUTATION_TIMEOUT_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.feed.mutation_timeout_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_CONNECT_TIMEOUT_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.realtime.connect_timeout_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_POLL_INTERVAL_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.realtime.poll_interval_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_STALE_AFTER_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.visibility.stale_after_secs = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_RESUME_DEBOUNCE_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.visibility.debounce_ms = value;
        }
        if let Ok(v) = std::env::var("COMMUNITY_SYNC_FAIL_OPEN_VISIBILITY") {
            cfg.policy.fail_open_visibility = parse_bool(&v, cfg.policy.fail_open_visibility);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.feed.page_size == 0 {
            return Err("Feed page_size must be greater than 0".to_string());
        }
        if self.cache.default_ttl_secs == 0 {
            return Err("Cache default_ttl_secs must be greater than 0".to_string());
        }
        if self.feed.mutation_timeout_ms == 0 {
            return Err("Feed mutation_timeout_ms must be greater than 0".to_string());
        }
        if self.realtime.poll_interval_ms == 0 {
            return Err("Realtime poll_interval_ms must be greater than 0".to_string());
        }
        if self.realtime.connect_timeout_ms >= self.realtime.poll_interval_ms {
            return Err("Realtime connect_timeout_ms must be shorter than poll_interval_ms".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
