//! Entity cache
//!
//! Repositories keep fully hydrated entities here, keyed by id:
//!
//! - **MemoryCache**: per-process LRU map
//! - **RedisCache**: JSON values in Redis, shared by every process
//!
//! Neither backend expires entries. A cached entity is trusted as-is until
//! the owning repository overwrites or evicts it, either directly after a
//! write or when an invalidation event arrives over pub/sub.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! user_limit = 2048
//! song_limit = 512
//! key_prefix = "rgdps:cache"
//! ```

mod config;
mod contract;
mod keys;
mod redis_store;
mod store;

pub use config::{CacheConfig, non_zero};
pub use contract::{Cache, CacheError};
pub use keys::CacheKey;
pub use redis_store::RedisCache;
pub use store::MemoryCache;
