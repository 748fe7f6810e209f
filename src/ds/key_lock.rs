//! Per-key mutual exclusion.
//!
//! [`KeyLocks`] serializes work on the same key (e.g. a fetch computation)
//! while letting different keys proceed in parallel. Only the set of keys
//! currently held is stored; a key's slot disappears as soon as its guard
//! is dropped.

use std::hash::Hash;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;

/// Set of keys currently locked, plus a condvar for waiters.
#[derive(Debug)]
pub struct KeyLocks<K> {
    held: Mutex<FxHashSet<K>>,
    released: Condvar,
}

impl<K> KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            held: Mutex::new(FxHashSet::default()),
            released: Condvar::new(),
        }
    }

    /// Blocks until `key` is free, then holds it until the guard drops.
    pub fn lock(&self, key: &K) -> KeyLockGuard<'_, K> {
        let mut held = self.held.lock();
        while held.contains(key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        KeyLockGuard {
            locks: self,
            key: key.clone(),
        }
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

impl<K> Default for KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its key on drop, including during unwinding.
#[derive(Debug)]
pub struct KeyLockGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    locks: &'a KeyLocks<K>,
    key: K,
}

impl<K> Drop for KeyLockGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}
