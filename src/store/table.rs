//! Sharded, thread-safe key→entry table behind the memory backend.
//!
//! ## Architecture
//!
//! ```text
//!   MemoryTable<V>
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │ selector: ShardSelector (16 shards)                           │
//!   │                                                               │
//!   │ shards[0]  RwLock<FxHashMap<CacheKey, Entry<V>>>              │
//!   │ shards[1]  RwLock<FxHashMap<CacheKey, Entry<V>>>              │
//!   │ ...                                                           │
//!   │                                                               │
//!   │ fetch_locks: KeyLocks<CacheKey>   one holder per key          │
//!   │ counters:    BackendCounters                                  │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never mutated: they are inserted, replaced or removed.
//! Expiration is passive. A lookup that finds `now >= expires_at` removes
//! the entry under the shard's write lock (re-checking first, since another
//! writer may have replaced it in between) and reports a miss. Only
//! [`purge_expired`](MemoryTable::purge_expired) walks a whole namespace.
//!
//! ## Shared tables
//!
//! [`MemoryTable::shared`] hands out the process-wide table for a value type.
//! Stores in different namespaces may all hold it; isolation comes from
//! [`CacheKey::belongs_to`] in the namespace-scoped bulk operations.
//! [`MemoryTable::release_shared`] drops the process-wide handle.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ds::{DEFAULT_SHARDS, KeyLockGuard, KeyLocks, ShardSelector};
use crate::key::CacheKey;
use crate::namespace::Namespace;
use crate::store::metrics::BackendCounters;

type SharedTables = FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>;

static SHARED_TABLES: Lazy<Mutex<SharedTables>> = Lazy::new(|| Mutex::new(FxHashMap::default()));

/// A stored value and its expiration deadline. `None` never expires.
#[derive(Debug, Clone)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Result of a single-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    Miss,
    /// The entry had expired and was evicted by this lookup.
    Expired,
}

type Shard<V> = RwLock<FxHashMap<CacheKey, Entry<V>>>;

/// Concurrent entry table. See the module docs.
#[derive(Debug)]
pub struct MemoryTable<V> {
    shards: Box<[Shard<V>]>,
    selector: ShardSelector,
    fetch_locks: KeyLocks<CacheKey>,
    pub(crate) counters: BackendCounters,
    shared: bool,
}

impl<V> MemoryTable<V> {
    /// A private table with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        Self::build(shards, false)
    }

    fn build(shards: usize, shared: bool) -> Self {
        let selector = ShardSelector::new(shards, 0);
        let shards = (0..selector.shard_count())
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Self {
            shards,
            selector,
            fetch_locks: KeyLocks::new(),
            counters: BackendCounters::default(),
            shared,
        }
    }

    /// Whether this is a process-wide table from [`shared`](Self::shared).
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total entries across all namespaces, expired or not.
    pub fn raw_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    #[inline]
    fn shard(&self, key: &CacheKey) -> &Shard<V> {
        &self.shards[self.selector.shard_for_key(key)]
    }

    pub(crate) fn insert(&self, key: CacheKey, value: V, expires_at: Option<Instant>) {
        self.shard(&key).write().insert(key, Entry { value, expires_at });
    }

    /// Removes an entry whatever its expiration state.
    pub(crate) fn remove(&self, key: &CacheKey) -> Option<V> {
        self.shard(key).write().remove(key).map(|entry| entry.value)
    }

    /// Whether an unexpired entry exists. Never evicts.
    pub(crate) fn contains_live(&self, key: &CacheKey, now: Instant) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Blocks until no other caller holds `key` for a fetch computation.
    pub(crate) fn lock_key(&self, key: &CacheKey) -> KeyLockGuard<'_, CacheKey> {
        self.fetch_locks.lock(key)
    }

    /// Removes every entry belonging to `namespace`. Returns how many.
    pub(crate) fn clear_namespace(&self, namespace: &Namespace) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut map = shard.write();
            let before = map.len();
            map.retain(|key, _| !key.belongs_to(namespace));
            removed += before - map.len();
        }
        removed
    }

    /// Removes every expired entry belonging to `namespace`. Returns how many.
    pub(crate) fn purge_expired(&self, namespace: &Namespace, now: Instant) -> usize {
        let mut purged = 0;
        for shard in self.shards.iter() {
            let mut map = shard.write();
            let before = map.len();
            map.retain(|key, entry| !(key.belongs_to(namespace) && entry.is_expired(now)));
            purged += before - map.len();
        }
        if purged > 0 {
            self.counters.add_expirations(purged as u64);
            trace!(namespace = %namespace, purged, "purged expired entries");
        }
        purged
    }

    /// Keys belonging to `namespace`, sorted.
    pub(crate) fn keys_in(&self, namespace: &Namespace) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .keys()
                    .filter(|key| key.belongs_to(namespace))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn len_in(&self, namespace: &Namespace) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .keys()
                    .filter(|key| key.belongs_to(namespace))
                    .count()
            })
            .sum()
    }
}

impl<V: Clone> MemoryTable<V> {
    /// Looks a key up, evicting it if it has expired.
    pub(crate) fn lookup(&self, key: &CacheKey, now: Instant) -> Lookup<V> {
        let shard = self.shard(key);
        {
            let map = shard.read();
            match map.get(key) {
                None => return Lookup::Miss,
                Some(entry) if !entry.is_expired(now) => return Lookup::Hit(entry.value.clone()),
                Some(_) => {},
            }
        }

        let mut map = shard.write();
        match map.get(key) {
            None => return Lookup::Miss,
            Some(entry) if !entry.is_expired(now) => return Lookup::Hit(entry.value.clone()),
            Some(_) => {},
        }
        map.remove(key);
        self.counters.add_expirations(1);
        trace!(key = %key, "evicted expired entry");
        Lookup::Expired
    }
}

impl<V> Default for MemoryTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryTable<V>
where
    V: Send + Sync + 'static,
{
    /// The process-wide table for `V`, created on first use.
    pub fn shared() -> Arc<Self> {
        let mut tables = SHARED_TABLES.lock();
        let type_id = TypeId::of::<V>();
        if let Some(existing) = tables.get(&type_id) {
            if let Ok(table) = Arc::clone(existing).downcast::<Self>() {
                return table;
            }
        }
        let table = Arc::new(Self::build(DEFAULT_SHARDS, true));
        tables.insert(type_id, Arc::clone(&table) as Arc<dyn Any + Send + Sync>);
        debug!(value_type = std::any::type_name::<V>(), "created shared memory table");
        table
    }

    /// Drops the process-wide handle for `V`. Stores already holding the
    /// table keep it alive; the next [`shared`](Self::shared) call starts a
    /// fresh one. Returns whether a table was registered.
    pub fn release_shared() -> bool {
        let released = SHARED_TABLES.lock().remove(&TypeId::of::<V>()).is_some();
        if released {
            debug!(value_type = std::any::type_name::<V>(), "released shared memory table");
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ns(name: &str) -> Namespace {
        Namespace::root().nested(name)
    }

    #[test]
    fn lookup_hit_miss_and_expiry() {
        let table = MemoryTable::new();
        let now = Instant::now();
        let key = ns("t").key("a");

        assert_eq!(table.lookup(&key, now), Lookup::Miss);

        table.insert(key.clone(), 1, Some(now + Duration::from_secs(10)));
        assert_eq!(table.lookup(&key, now + Duration::from_secs(9)), Lookup::Hit(1));
        assert_eq!(table.lookup(&key, now + Duration::from_secs(10)), Lookup::Expired);
        assert_eq!(table.raw_len(), 0);
        assert_eq!(table.lookup(&key, now + Duration::from_secs(10)), Lookup::Miss);
    }

    #[test]
    fn contains_live_does_not_evict() {
        let table = MemoryTable::new();
        let now = Instant::now();
        let key = ns("t").key("a");
        table.insert(key.clone(), "v", Some(now));
        assert!(!table.contains_live(&key, now));
        assert_eq!(table.raw_len(), 1);
    }

    #[test]
    fn remove_ignores_expiry() {
        let table = MemoryTable::new();
        let now = Instant::now();
        let key = ns("t").key("a");
        table.insert(key.clone(), 5, Some(now));
        assert_eq!(table.remove(&key), Some(5));
        assert_eq!(table.remove(&key), None);
    }

    #[test]
    fn namespace_scoped_bulk_operations() {
        let table = MemoryTable::new();
        let now = Instant::now();
        let later = Some(now + Duration::from_secs(60));
        let users = ns("users");
        let users2 = ns("users2");

        table.insert(users.key("a"), 1, later);
        table.insert(users.nested("deep").key("b"), 2, later);
        table.insert(users.key("old"), 3, Some(now));
        table.insert(users2.key("a"), 4, later);

        assert_eq!(table.len_in(&users), 3);
        assert_eq!(table.purge_expired(&users, now), 1);
        assert_eq!(
            table.keys_in(&users),
            vec![users.key("a"), users.nested("deep").key("b")]
        );

        assert_eq!(table.clear_namespace(&users), 2);
        assert_eq!(table.keys_in(&users2), vec![users2.key("a")]);
    }

    #[test]
    fn entry_without_deadline_never_expires() {
        let table = MemoryTable::new();
        let now = Instant::now();
        let key = ns("t").key("forever");
        table.insert(key.clone(), 9, None);

        let far = now + Duration::from_secs(10 * 365 * 24 * 3600);
        assert_eq!(table.lookup(&key, far), Lookup::Hit(9));
        assert!(table.contains_live(&key, far));
        assert_eq!(table.purge_expired(&ns("t"), far), 0);
    }

    #[test]
    fn shared_table_is_per_value_type() {
        #[derive(Clone)]
        struct OnlyHere;

        let a = MemoryTable::<OnlyHere>::shared();
        let b = MemoryTable::<OnlyHere>::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_shared());

        assert!(MemoryTable::<OnlyHere>::release_shared());
        let c = MemoryTable::<OnlyHere>::shared();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(MemoryTable::<OnlyHere>::release_shared());
        assert!(!MemoryTable::<OnlyHere>::release_shared());
    }
}
