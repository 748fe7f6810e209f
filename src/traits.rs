//! # Store Contract
//!
//! Every backend and every decorator implements [`Store<V>`]. The trait is
//! object safe so a backend and its decorator chain can be assembled at
//! runtime into one [`SharedStore<V>`].
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                 Store<V>                     │
//!                 │                                              │
//!                 │  read(&K)            → Snapshot<Maybe<V>>    │
//!                 │  write(&K, V)        → Snapshot<V>           │
//!                 │  delete(&K)          → Maybe<V>              │
//!                 │  contains_key(&K)    → bool                  │
//!                 │  clear()             → ()                    │
//!                 │  fetch(&K, compute)  → Snapshot<Maybe<V>>    │
//!                 │  read_all / write_all / fetch_all            │
//!                 │  rescope(Namespace)  → SharedStore<V>        │
//!                 └──────────────────────┬───────────────────────┘
//!                                        │
//!            ┌───────────────────────────┼──────────────────────────┐
//!            ▼                           ▼                          ▼
//!   ┌──────────────────┐      ┌─────────────────────┐    ┌──────────────────────┐
//!   │ MemoryBackend<V> │      │ AdapterBackend<V,A> │    │ DecoratedStore<V,D>  │
//!   │ (leaf, TTL)      │      │ (leaf, external)    │    │ (wraps SharedStore)  │
//!   └──────────────────┘      └─────────────────────┘    └──────────────────────┘
//! ```
//!
//! Every fallible operation returns a [`CacheResult`]. A miss is
//! `Right(Snapshot(Nothing))`; only a malfunction is a `Left`. Backend
//! failures are converted to [`StoreError`](crate::error::StoreError) at the
//! store boundary and never escape as panics.
//!
//! ## Batch policy
//!
//! | Operation   | On error        | Provenance                        |
//! |-------------|-----------------|-----------------------------------|
//! | `read_all`  | first error wins | `cached` per snapshot            |
//! | `write_all` | first error wins | `updated` per snapshot           |
//! | `fetch_all` | first error wins | `cached` or `computed` per key   |
//!
//! Batches run keys in caller order and are not atomic: an error midway
//! leaves earlier writes in place.
//!
//! ## Example Usage
//!
//! ```
//! use typed_cache::prelude::*;
//!
//! let store = MemoryBackend::<String>::new(Namespace::at(["docs"])).into_shared();
//!
//! let first = store.fetch_with("greet", || Some("hello".to_string())).right_or_raise();
//! assert!(first.is_computed());
//!
//! let second = store.fetch_with("greet", || Some("ignored".to_string())).right_or_raise();
//! assert!(second.is_cached());
//! assert_eq!(second.into_value(), Maybe::Some("hello".to_string()));
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::algebra::{Either, Maybe};
use crate::cache_ref::CacheRef;
use crate::error::{BoxError, CacheResult};
use crate::key::{CacheKey, IntoCacheKey};
use crate::namespace::{Namespace, NamespaceTarget};
use crate::snapshot::Snapshot;

/// A store behind shared ownership. This is what the builder produces.
pub type SharedStore<V> = Arc<dyn Store<V>>;

/// What a fetch computation returns: a value, `None` (nothing is written),
/// or a failure.
pub type ComputeResult<V> = Result<Option<V>, BoxError>;

/// Fetch computation for one key.
pub type Compute<'a, V> = dyn FnMut() -> ComputeResult<V> + 'a;

/// Fetch computation for a batch; receives the key being computed.
pub type BatchCompute<'a, V> = dyn FnMut(&CacheKey) -> ComputeResult<V> + 'a;

/// Aggregated batch result.
pub type SnapshotMap<T> = FxHashMap<CacheKey, Snapshot<T>>;

/// The operation surface shared by backends and decorators.
pub trait Store<V>: Send + Sync {
    /// Namespace every string key is qualified with.
    fn namespace(&self) -> &Namespace;

    /// Identifier used in instrumentation and debugging, e.g. `memory` or
    /// `instrumented(memory)`.
    fn store_type(&self) -> String;

    /// Reads a key. Absent or expired keys yield `Nothing`.
    fn read(&self, key: &CacheKey) -> CacheResult<Snapshot<Maybe<V>>>;

    /// Inserts or replaces a value.
    fn write(&self, key: &CacheKey, value: V) -> CacheResult<Snapshot<V>>;

    /// Removes a key, returning the prior value if there was one.
    fn delete(&self, key: &CacheKey) -> CacheResult<Maybe<V>>;

    /// Whether a live (unexpired) entry exists.
    fn contains_key(&self, key: &CacheKey) -> bool;

    /// Removes every entry in this store's namespace, and nothing else.
    fn clear(&self) -> CacheResult<()>;

    /// Returns the cached value, or runs `compute`, stores a `Some` result,
    /// and returns it as `computed`. A `None` result is returned as
    /// `computed` `Nothing` and not stored.
    fn fetch(
        &self,
        key: &CacheKey,
        compute: &mut Compute<'_, V>,
    ) -> CacheResult<Snapshot<Maybe<V>>>;

    /// A new store over the same backing data, scoped to `namespace`.
    fn rescope(&self, namespace: Namespace) -> SharedStore<V>;

    fn read_all(&self, keys: &[CacheKey]) -> CacheResult<SnapshotMap<Maybe<V>>> {
        let mut out = SnapshotMap::default();
        for key in keys {
            match self.read(key) {
                Either::Right(snapshot) => {
                    out.insert(key.clone(), snapshot);
                },
                Either::Left(err) => return Either::Left(err),
            }
        }
        Either::Right(out)
    }

    fn write_all(&self, entries: Vec<(CacheKey, V)>) -> CacheResult<SnapshotMap<V>> {
        let mut out = SnapshotMap::default();
        for (key, value) in entries {
            match self.write(&key, value) {
                Either::Right(snapshot) => {
                    out.insert(key, snapshot);
                },
                Either::Left(err) => return Either::Left(err),
            }
        }
        Either::Right(out)
    }

    /// Fetches each key in order. Each snapshot keeps its own `cached` or
    /// `computed` source.
    fn fetch_all(
        &self,
        keys: &[CacheKey],
        compute: &mut BatchCompute<'_, V>,
    ) -> CacheResult<SnapshotMap<Maybe<V>>> {
        let mut out = SnapshotMap::default();
        for key in keys {
            match self.fetch(key, &mut || compute(key)) {
                Either::Right(snapshot) => {
                    out.insert(key.clone(), snapshot);
                },
                Either::Left(err) => return Either::Left(err),
            }
        }
        Either::Right(out)
    }

    /// Rescopes relative to the current namespace: a segment or segment list
    /// nests below it, a full [`Namespace`] replaces it.
    fn with_namespace(&self, target: NamespaceTarget) -> SharedStore<V> {
        self.rescope(target.resolve(self.namespace()))
    }

    /// Qualifies a raw key with this store's namespace.
    fn key(&self, key: &str) -> CacheKey {
        self.namespace().key(key)
    }
}

/// Generic conveniences over any [`Store`]: string keys, plain closures.
pub trait StoreExt<V>: Store<V> {
    fn get(&self, key: impl IntoCacheKey) -> CacheResult<Snapshot<Maybe<V>>> {
        let key = key.into_cache_key(self.namespace());
        self.read(&key)
    }

    fn set(&self, key: impl IntoCacheKey, value: V) -> CacheResult<Snapshot<V>> {
        let key = key.into_cache_key(self.namespace());
        self.write(&key, value)
    }

    fn remove(&self, key: impl IntoCacheKey) -> CacheResult<Maybe<V>> {
        let key = key.into_cache_key(self.namespace());
        self.delete(&key)
    }

    fn has(&self, key: impl IntoCacheKey) -> bool {
        let key = key.into_cache_key(self.namespace());
        self.contains_key(&key)
    }

    /// `fetch` with an infallible computation.
    fn fetch_with<F>(&self, key: impl IntoCacheKey, f: F) -> CacheResult<Snapshot<Maybe<V>>>
    where
        F: FnOnce() -> Option<V>,
    {
        let key = key.into_cache_key(self.namespace());
        let mut f = Some(f);
        self.fetch(&key, &mut || Ok(f.take().and_then(|f| f())))
    }

    /// `fetch` with a fallible computation. Errors become
    /// [`StoreError`](crate::error::StoreError)s with operation `fetch`.
    fn try_fetch_with<F, E>(&self, key: impl IntoCacheKey, f: F) -> CacheResult<Snapshot<Maybe<V>>>
    where
        F: FnOnce() -> Result<Option<V>, E>,
        E: Into<BoxError>,
    {
        let key = key.into_cache_key(self.namespace());
        let mut f = Some(f);
        self.fetch(&key, &mut || match f.take() {
            Some(f) => f().map_err(Into::<BoxError>::into),
            None => Ok(None),
        })
    }

    fn get_many<I, K>(&self, keys: I) -> CacheResult<SnapshotMap<Maybe<V>>>
    where
        I: IntoIterator<Item = K>,
        K: IntoCacheKey,
    {
        let keys: Vec<CacheKey> = keys
            .into_iter()
            .map(|k| k.into_cache_key(self.namespace()))
            .collect();
        self.read_all(&keys)
    }

    fn set_many<I, K>(&self, entries: I) -> CacheResult<SnapshotMap<V>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: IntoCacheKey,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into_cache_key(self.namespace()), v))
            .collect();
        self.write_all(entries)
    }

    fn fetch_all_with<I, K, F>(&self, keys: I, mut f: F) -> CacheResult<SnapshotMap<Maybe<V>>>
    where
        I: IntoIterator<Item = K>,
        K: IntoCacheKey,
        F: FnMut(&CacheKey) -> Option<V>,
    {
        let keys: Vec<CacheKey> = keys
            .into_iter()
            .map(|k| k.into_cache_key(self.namespace()))
            .collect();
        self.fetch_all(&keys, &mut |key: &CacheKey| Ok::<_, BoxError>(f(key)))
    }
}

impl<V, S: Store<V> + ?Sized> StoreExt<V> for S {}

/// Bound references from a shared store.
pub trait CacheRefExt<V> {
    /// Pairs this store with one key.
    fn cache_ref(&self, key: impl IntoCacheKey) -> CacheRef<V>;
}

impl<V> CacheRefExt<V> for SharedStore<V> {
    fn cache_ref(&self, key: impl IntoCacheKey) -> CacheRef<V> {
        let key = key.into_cache_key(self.namespace());
        CacheRef::new(Arc::clone(self), key)
    }
}
