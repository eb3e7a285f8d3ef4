use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use community_sync::domain::entities::sync::{HAS_LIKED, LIKE_COUNT, UNREAD_COUNT};
use community_sync::shared::config::AppConfig;
use community_sync::FeedItem;
use serde_json::json;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn create_test_post(id: &str, like_count: i64) -> FeedItem {
    FeedItem::new(id, base_time())
        .with_counter(LIKE_COUNT, like_count)
        .with_flag(HAS_LIKED, false)
        .with_content(json!({ "body": format!("Test post content {id}") }))
}

/// 新しい順に `count` 件
pub fn create_test_posts(count: usize) -> Vec<FeedItem> {
    (0..count)
        .map(|index| {
            let mut post = create_test_post(&format!("post_{index}"), 0);
            post.created_at = base_time() - TimeDelta::minutes(index as i64);
            post
        })
        .collect()
}

pub fn create_test_conversation(id: &str, unread: i64) -> FeedItem {
    FeedItem::new(id, base_time())
        .with_counter(UNREAD_COUNT, unread)
        .with_content(json!({ "title": format!("Conversation {id}") }))
}

/// 永続化なしの設定
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.cache.database_url = None;
    config
}
