pub mod cache_entry;
pub mod feed_item;
pub mod feed_window;

pub use cache_entry::CacheEntry;
pub use feed_item::{
    COMMENT_COUNT, FeedItem, HAS_LIKED, HAS_SHARED, ItemPatch, LIKE_COUNT, SHARE_COUNT,
    UNREAD_COUNT,
};
pub use feed_window::{FeedWindow, dedup_by_id};
