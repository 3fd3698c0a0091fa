//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

/// Expiry value meaning "never expires".
pub const NO_EXPIRY: u64 = 0;

// == Cache Entry ==
/// A single key/value pair owned by exactly one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<K, V> {
    /// The key, kept alongside the value so eviction can unindex it
    pub key: K,
    /// The stored value
    pub value: V,
    /// Absolute expiry in Unix milliseconds, `NO_EXPIRY` = never
    pub expires_at: u64,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new entry whose expiry is `ttl_ms` after `now_ms`.
    ///
    /// # Arguments
    /// * `ttl_ms` - Time to live in milliseconds, `0` for no expiry
    /// * `now_ms` - Current time from the cache's time source
    pub fn new(key: K, value: V, ttl_ms: u64, now_ms: u64) -> Self {
        Self {
            key,
            value,
            expires_at: expiry_from_ttl(ttl_ms, now_ms),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once the current time reaches its expiry instant,
    /// so a TTL of `n` ms leaves the entry readable for exactly `n` ms.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at != NO_EXPIRY && now_ms >= self.expires_at
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        if self.expires_at == NO_EXPIRY {
            None
        } else {
            Some(self.expires_at.saturating_sub(now_ms))
        }
    }
}

/// Converts a relative TTL into an absolute expiry instant.
pub fn expiry_from_ttl(ttl_ms: u64, now_ms: u64) -> u64 {
    if ttl_ms == 0 {
        NO_EXPIRY
    } else {
        now_ms.saturating_add(ttl_ms)
    }
}
