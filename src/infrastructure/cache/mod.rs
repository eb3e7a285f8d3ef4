pub mod memory_store;
pub mod ttl_cache;

pub use memory_store::MemoryKeyValueStore;
pub use ttl_cache::TtlCache;
