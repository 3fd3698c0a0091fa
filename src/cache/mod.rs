//! Cache Module
//!
//! Sharded in-memory LRU cache with TTL expiration.

mod entry;
mod lru;
mod router;
mod shard;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, NO_EXPIRY};
pub use lru::{Handle, LruList};
pub use router::ShardedCache;
pub use shard::Shard;
pub use stats::CacheStats;
