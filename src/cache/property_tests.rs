//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the shard against a naive reference LRU and the
//! router against its capacity and size invariants.

use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::cache::{Shard, ShardedCache};
use crate::clock::{ManualClock, TimeSource};

// == Strategies ==
/// Small key space so that sequences revisit keys often.
fn key_strategy() -> impl Strategy<Value = u8> {
    0u8..24
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: u8, value: u32 },
    Get { key: u8 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), any::<u32>()).prop_map(|(key, value)| CacheOp::Put { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

// == Reference Model ==
/// Obviously-correct LRU: front = most recent.
struct ModelLru {
    capacity: usize,
    order: VecDeque<(u8, u32)>,
}

impl ModelLru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
        }
    }

    fn take(&mut self, key: u8) -> Option<(u8, u32)> {
        let pos = self.order.iter().position(|(k, _)| *k == key)?;
        self.order.remove(pos)
    }

    fn put(&mut self, key: u8, value: u32) {
        if self.take(key).is_none() && self.order.len() >= self.capacity {
            self.order.pop_back();
        }
        self.order.push_front((key, value));
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let entry = self.take(key)?;
        self.order.push_front(entry);
        Some(entry.1)
    }
}

fn shard(capacity: usize) -> Shard<u8, u32> {
    let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::new(0));
    Shard::new(capacity, clock)
}

fn shard_order(shard: &Shard<u8, u32>) -> Vec<(u8, u32)> {
    let mut out = Vec::new();
    shard.for_each(|k, v, _| out.push((*k, *v)));
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Size never exceeds capacity after any operation.
    #[test]
    fn prop_capacity_bound(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..200)
    ) {
        let shard = shard(capacity);

        for op in ops {
            match op {
                CacheOp::Put { key, value } => shard.put(key, value, 0),
                CacheOp::Get { key } => { let _ = shard.get(&key); }
            }
            prop_assert!(shard.size() <= capacity, "size {} > capacity {}", shard.size(), capacity);
        }
        prop_assert!(shard.check_invariants());
    }

    // Every read and the full recency order match the reference LRU.
    #[test]
    fn prop_matches_reference_lru(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..200)
    ) {
        let shard = shard(capacity);
        let mut model = ModelLru::new(capacity);

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    shard.put(key, value, 0);
                    model.put(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(shard.get(&key), model.get(key));
                }
            }
        }

        let expected: Vec<(u8, u32)> = model.order.iter().copied().collect();
        prop_assert_eq!(shard_order(&shard), expected);
    }

    // The key touched last is never the next one evicted.
    #[test]
    fn prop_touched_key_survives_next_eviction(
        keys in prop::collection::hash_set(key_strategy(), 2..8),
        touch_index in any::<prop::sample::Index>()
    ) {
        let keys: Vec<u8> = keys.into_iter().collect();
        let shard = shard(keys.len());
        for &key in &keys {
            shard.put(key, u32::from(key), 0);
        }

        let touched = keys[touch_index.index(keys.len())];
        prop_assert!(shard.get(&touched).is_some());

        // 200 is outside the key strategy, so this always evicts.
        shard.put(200, 0, 0);

        prop_assert!(shard.get(&touched).is_some(), "touched key {} was evicted", touched);
        prop_assert_eq!(shard.size(), keys.len());
    }

    // Router: size is the sum of shard sizes and never exceeds total capacity.
    #[test]
    fn prop_router_capacity_and_size(
        capacity in 1usize..64,
        concurrency in 1usize..32,
        keys in prop::collection::vec(any::<u16>(), 0..300)
    ) {
        let cache = ShardedCache::new(capacity, concurrency).unwrap();
        prop_assert!(cache.shard_count().is_power_of_two());
        prop_assert!(cache.shard_count() <= capacity);
        let total: usize = cache.shards().iter().map(Shard::capacity).sum();
        prop_assert_eq!(total, capacity);

        for key in keys {
            cache.put(key, key, 0);
            prop_assert!(cache.size() <= capacity);
        }

        let sum: usize = cache.shards().iter().map(Shard::size).sum();
        prop_assert_eq!(cache.size(), sum);
        prop_assert!(cache.check_size_invariant());
    }
}

// Separate block for TTL behavior driven by the manual clock.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // An entry is visible strictly before its deadline and gone at or after it.
    #[test]
    fn prop_ttl_visibility(ttl in 1u64..10_000, elapsed in 0u64..20_000) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let shard: Shard<u8, u32> = Shard::new(4, clock.clone());

        shard.put(1, 42, ttl);
        clock.advance(elapsed);

        if elapsed < ttl {
            prop_assert_eq!(shard.get(&1), Some(42));
        } else {
            prop_assert_eq!(shard.get(&1), None);
            prop_assert_eq!(shard.size(), 0);
        }
    }

    // Repeated bounded sweeps eventually remove every expired entry and nothing else.
    #[test]
    fn prop_sweep_removes_only_expired(
        ttls in prop::collection::vec(0u64..200, 1..16),
        budget in 1usize..5
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let shard: Shard<u8, u32> = Shard::new(16, clock.clone());
        for (i, ttl) in ttls.iter().enumerate() {
            shard.put(i as u8, 0, *ttl);
        }
        clock.set(100);

        let expired = ttls.iter().filter(|&&t| t != 0 && t <= 100).count();
        let mut removed = 0;
        for _ in 0..(16 / budget + 2) {
            removed += shard.cleanup_expired(budget);
        }

        prop_assert_eq!(removed, expired);
        prop_assert_eq!(shard.size(), ttls.len() - expired);
        prop_assert!(shard.check_invariants());
    }
}
