pub mod sync;

pub use sync::{CacheEntry, FeedItem, FeedWindow, ItemPatch};
