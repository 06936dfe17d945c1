pub mod cache;
pub mod key;
pub mod memory;
pub mod redis;
pub mod store;

pub use cache::Cache;
pub use key::{normalize_market_id, CacheKey, ContextHash, EntityKind, GLOBAL_MARKET};
pub use memory::MemoryStore;
pub use self::redis::{create_redis_client, RedisStore};
pub use store::{KeyValueStore, StoreError, StoreResult};
