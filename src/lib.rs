//! LRU Cache Server - A sharded in-memory cache with TTL expiry
//!
//! Provides a capacity-bounded LRU cache split into independently locked
//! shards, a background janitor for expired entries, crash-safe snapshots,
//! a line-protocol TCP server and a small admin HTTP API.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod server;
pub mod tasks;

pub use api::AppState;
pub use cache::ShardedCache;
pub use config::Config;
pub use error::{CacheError, Result};
pub use persistence::SnapshotManager;
pub use tasks::Janitor;
