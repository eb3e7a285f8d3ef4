pub mod action_key;
pub mod cache_key;
pub mod entity_kind;
pub mod field_set;
pub mod identity_scope;
pub mod mutation_id;

pub use action_key::ActionKey;
pub use cache_key::CacheKey;
pub use entity_kind::EntityKind;
pub use field_set::FieldSet;
pub use identity_scope::IdentityScope;
pub use mutation_id::MutationId;
