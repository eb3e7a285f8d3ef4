pub mod sync;

pub use sync::{ActionKey, CacheKey, EntityKind, FieldSet, IdentityScope, MutationId};
