//! Cache Router Module
//!
//! Owns the shard array and routes every key to exactly one shard.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, Shard};
use crate::clock::{SystemClock, TimeSource};
use crate::error::{CacheError, Result};
use crate::tasks::Janitor;

// == Sharded Cache ==
/// Thread-safe, capacity-bounded LRU cache split into independently locked
/// shards. Share it across threads via `Arc<ShardedCache<K, V>>`.
///
/// A key always maps to the same shard for the lifetime of the cache, so
/// `get`/`put` only ever take that one shard's lock.
pub struct ShardedCache<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// `shards.len() - 1`; shard count is a power of two
    mask: usize,
    capacity: usize,
    /// Fixed-key hasher so routing is reproducible between runs
    hasher: BuildHasherDefault<DefaultHasher>,
    clock: Arc<dyn TimeSource>,
}

impl<K, V> ShardedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache on the system clock.
    ///
    /// # Arguments
    /// * `capacity` - Total number of entries across all shards
    /// * `concurrency_level` - Requested shard count
    pub fn new(capacity: usize, concurrency_level: usize) -> Result<Self> {
        Self::with_clock(capacity, concurrency_level, Arc::new(SystemClock))
    }

    /// Creates a cache whose expiry math uses `clock`.
    ///
    /// The shard count is the smallest power of two `>= concurrency_level`,
    /// halved until it no longer exceeds `capacity`. The first
    /// `capacity % shards` shards get one extra slot.
    pub fn with_clock(
        capacity: usize,
        concurrency_level: usize,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::Config(format!(
                "capacity must be positive, got {capacity}"
            )));
        }
        if concurrency_level == 0 {
            return Err(CacheError::Config(format!(
                "concurrency level must be positive, got {concurrency_level}"
            )));
        }

        let mut shard_count = concurrency_level.checked_next_power_of_two().ok_or_else(|| {
            CacheError::Config(format!("concurrency level too large: {concurrency_level}"))
        })?;
        while shard_count > capacity {
            shard_count /= 2;
        }

        let base = capacity / shard_count;
        let remainder = capacity % shard_count;
        let shards = (0..shard_count)
            .map(|i| {
                let shard_capacity = if i < remainder { base + 1 } else { base };
                Shard::new(shard_capacity, clock.clone())
            })
            .collect();

        Ok(Self {
            shards,
            mask: shard_count - 1,
            capacity,
            hasher: BuildHasherDefault::default(),
            clock,
        })
    }

    // == Routing ==
    /// Index of the shard that owns `key`.
    ///
    /// The upper 16 bits of the 32-bit hash are folded into the lower ones
    /// before masking, so hashes that differ mostly in high bits still spread.
    pub fn route(&self, key: &K) -> usize {
        let h = self.hasher.hash_one(key) as u32;
        ((h ^ (h >> 16)) as usize) & self.mask
    }

    // == Put ==
    /// Stores `value` under `key`; `ttl_ms == 0` means no expiry.
    pub fn put(&self, key: K, value: V, ttl_ms: u64) {
        self.shards[self.route(&key)].put(key, value, ttl_ms);
    }

    // == Get ==
    /// Returns the live value for `key`, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shards[self.route(key)].get(key)
    }

    // == Size ==
    /// Sum of every shard's size. Not atomic across shards.
    pub fn size(&self) -> usize {
        self.shards.iter().map(Shard::size).sum()
    }

    // == For Each ==
    /// Visits every entry as `(key, value, expires_at)`, one shard at a time.
    ///
    /// Each shard is locked only while it is visited, so the traversal is
    /// consistent per shard but not across the whole cache.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V, u64),
    {
        for shard in self.shards.iter() {
            shard.for_each(&mut visitor);
        }
    }

    // == Stats ==
    /// Aggregated counters of all shards.
    pub fn stats(&self) -> CacheStats {
        let mut total = CacheStats::new();
        for shard in self.shards.iter() {
            total.merge(&shard.stats());
        }
        total
    }

    /// Runs the per-shard consistency check on every shard.
    pub fn check_size_invariant(&self) -> bool {
        self.shards.iter().all(Shard::check_invariants)
    }

    /// The shard array, in routing order.
    pub fn shards(&self) -> &[Shard<K, V>] {
        &self.shards
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total capacity requested at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The time source shared by every shard.
    pub fn clock(&self) -> Arc<dyn TimeSource> {
        self.clock.clone()
    }
}

impl<K, V> ShardedCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    // == Constructor With Janitor ==
    /// Builds a shared cache and starts its janitor on the current tokio
    /// runtime.
    ///
    /// # Arguments
    /// * `capacity` - Total number of entries across all shards
    /// * `concurrency_level` - Requested shard count
    /// * `interval` - Time between janitor passes
    /// * `budget` - Entries inspected per shard per pass
    pub fn spawn_with_janitor(
        capacity: usize,
        concurrency_level: usize,
        interval: Duration,
        budget: usize,
    ) -> Result<(Arc<Self>, Janitor)> {
        let cache = Arc::new(Self::new(capacity, concurrency_level)?);
        let janitor = Janitor::spawn(cache.clone(), interval, budget);
        Ok((cache, janitor))
    }
}

impl<K, V> fmt::Debug for ShardedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCache")
            .field("capacity", &self.capacity)
            .field("shard_count", &self.shards.len())
            .finish_non_exhaustive()
    }
}
