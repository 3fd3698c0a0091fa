//! Cache Shard Module
//!
//! One independently locked LRU store holding a slice of the keyspace.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::lru::{Handle, LruList};
use crate::cache::{CacheEntry, CacheStats};
use crate::clock::TimeSource;

// == Shard State ==
/// Everything guarded by the shard lock.
///
/// `index` and `order` always hold the same set of entries: every key in the
/// index has exactly one node in the order and vice versa.
#[derive(Debug)]
struct ShardState<K, V> {
    index: HashMap<K, Handle>,
    order: LruList<CacheEntry<K, V>>,
    stats: CacheStats,
    /// Next arena slot the expiry sweep inspects
    sweep_cursor: usize,
}

impl<K, V> ShardState<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            order: LruList::with_capacity(capacity),
            stats: CacheStats::new(),
            sweep_cursor: 0,
        }
    }

    fn get(&mut self, key: &K, now_ms: u64) -> Option<V> {
        let Some(&handle) = self.index.get(key) else {
            self.stats.record_miss();
            return None;
        };

        let expired = self
            .order
            .get(handle)
            .map_or(true, |entry| entry.is_expired(now_ms));
        if expired {
            self.remove_handle(handle);
            self.stats.record_expiration();
            self.stats.record_miss();
            return None;
        }

        self.order.move_to_front(handle);
        self.stats.record_hit();
        self.order.get(handle).map(|entry| entry.value.clone())
    }

    fn put(&mut self, key: K, value: V, ttl_ms: u64, now_ms: u64, capacity: usize) {
        if let Some(&handle) = self.index.get(&key) {
            if let Some(entry) = self.order.get_mut(handle) {
                *entry = CacheEntry::new(key, value, ttl_ms, now_ms);
                self.order.move_to_front(handle);
                return;
            }
            // Stale index slot; drop it and insert fresh below.
            self.index.remove(&key);
        }

        if self.index.len() >= capacity {
            if let Some(evicted) = self.order.pop_back() {
                self.index.remove(&evicted.key);
                self.stats.record_eviction();
            }
        }

        let handle = self
            .order
            .push_front(CacheEntry::new(key.clone(), value, ttl_ms, now_ms));
        self.index.insert(key, handle);
    }

    fn remove_handle(&mut self, handle: Handle) -> Option<CacheEntry<K, V>> {
        let entry = self.order.remove(handle)?;
        self.index.remove(&entry.key);
        Some(entry)
    }

    fn cleanup_expired(&mut self, budget: usize, now_ms: u64) -> usize {
        let slots = self.order.slot_count();
        if slots == 0 {
            return 0;
        }

        let mut removed = 0;
        for _ in 0..budget.min(slots) {
            if self.sweep_cursor >= slots {
                self.sweep_cursor = 0;
            }
            let handle = self.sweep_cursor;
            self.sweep_cursor += 1;

            let expired = self
                .order
                .get(handle)
                .is_some_and(|entry| entry.is_expired(now_ms));
            // A vacant or already-removed slot just counts against the budget.
            if expired && self.remove_handle(handle).is_some() {
                self.stats.record_expiration();
                removed += 1;
            }
        }
        removed
    }

    fn is_consistent(&self, capacity: usize) -> bool {
        self.index.len() == self.order.len()
            && self.order.len() <= capacity
            && self.index.iter().all(|(key, &handle)| {
                self.order
                    .get(handle)
                    .is_some_and(|entry| &entry.key == key)
            })
            && self.order.iter().count() == self.order.len()
    }
}

// == Shard ==
/// A bounded LRU store guarded by its own lock.
///
/// Every public method takes the lock for the duration of the call only;
/// the guard releases it on every exit path.
pub struct Shard<K, V> {
    state: Mutex<ShardState<K, V>>,
    capacity: usize,
    clock: Arc<dyn TimeSource>,
}

impl<K, V> Shard<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty shard holding at most `capacity` entries.
    ///
    /// A zero capacity is raised to one; the router never builds such a
    /// shard, but a shard must always be able to hold the entry just put.
    pub fn new(capacity: usize, clock: Arc<dyn TimeSource>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(ShardState::new(capacity)),
            capacity,
            clock,
        }
    }

    // == Get ==
    /// Returns the value for `key` and marks it most recently used.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        self.state.lock().get(key, now)
    }

    // == Put ==
    /// Inserts or replaces `key`, evicting the least recently used entry if
    /// the shard is full. `ttl_ms == 0` means the entry never expires.
    pub fn put(&self, key: K, value: V, ttl_ms: u64) {
        let now = self.clock.now_ms();
        self.state.lock().put(key, value, ttl_ms, now, self.capacity);
    }

    // == Size ==
    /// Number of tracked entries, including expired ones not yet swept.
    pub fn size(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Maximum number of entries this shard holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Cleanup Expired ==
    /// Inspects at most `budget` entries and removes the expired ones.
    ///
    /// Inspection resumes where the previous call stopped, so repeated calls
    /// cover the whole shard. Returns the number of entries removed.
    pub fn cleanup_expired(&self, budget: usize) -> usize {
        let now = self.clock.now_ms();
        self.state.lock().cleanup_expired(budget, now)
    }

    // == For Each ==
    /// Visits every entry, most recently used first, with `(key, value, expires_at)`.
    ///
    /// The shard stays locked for the whole visit.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V, u64),
    {
        let state = self.state.lock();
        for entry in state.order.iter() {
            visitor(&entry.key, &entry.value, entry.expires_at);
        }
    }

    // == Stats ==
    /// Returns a copy of this shard's counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.index.len());
        stats
    }

    /// Checks the index/order correspondence and the capacity bound.
    pub fn check_invariants(&self) -> bool {
        self.state.lock().is_consistent(self.capacity)
    }
}
