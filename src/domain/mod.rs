pub mod entities;
pub mod value_objects;

pub use entities::{CacheEntry, FeedItem, FeedWindow, ItemPatch};
pub use value_objects::{ActionKey, CacheKey, EntityKind, FieldSet, IdentityScope, MutationId};
