//! Deterministic key-to-shard mapping for the sharded memory table.
//!
//! ```text
//!   CacheKey "app:users:42"
//!        │  FxHasher(seed, key)
//!        ▼
//!   ShardSelector { shards: 16 }  ── hash % 16 ──► shard 5
//!        │
//!        ▼
//!   RwLock<FxHashMap<CacheKey, Entry<V>>>
//! ```
//!
//! A key always lands on the same shard for a given selector, so its entry
//! and its expiration check meet under one lock.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Default shard count for memory tables.
pub const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
    seed: u64,
}

impl ShardSelector {
    /// `shards` below 1 is treated as 1.
    pub fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: shards.max(1),
            seed,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    pub fn shard_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        if self.shards == 1 {
            return 0;
        }
        let mut hasher = FxHasher::default();
        hasher.write_u64(self.seed);
        key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS, 0)
    }
}
