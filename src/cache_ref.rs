//! A store bound to one key.
//!
//! ```
//! use typed_cache::prelude::*;
//!
//! let store = MemoryBackend::<u64>::new(Namespace::at(["counters"])).into_shared();
//! let hits = store.cache_ref("hits");
//!
//! hits.update(|n| Maybe::Some(n.value_or(0) + 1)).right_or_raise();
//! hits.update(|n| Maybe::Some(n.value_or(0) + 1)).right_or_raise();
//! assert_eq!(hits.value().right_or_raise(), 2);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::algebra::{Either, Maybe};
use crate::error::{BoxError, CacheError, CacheMissError, CacheResult, StoreError};
use crate::key::CacheKey;
use crate::snapshot::Snapshot;
use crate::traits::{SharedStore, StoreExt};

/// Pairs a [`SharedStore`] with a [`CacheKey`]. Holds no other state; clones
/// share the store.
pub struct CacheRef<V> {
    store: SharedStore<V>,
    key: CacheKey,
}

impl<V> CacheRef<V> {
    pub fn new(store: SharedStore<V>, key: CacheKey) -> Self {
        Self { store, key }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn store(&self) -> &SharedStore<V> {
        &self.store
    }

    pub fn read(&self) -> CacheResult<Snapshot<Maybe<V>>> {
        self.store.read(&self.key)
    }

    pub fn write(&self, value: V) -> CacheResult<Snapshot<V>> {
        self.store.write(&self.key, value)
    }

    pub fn delete(&self) -> CacheResult<Maybe<V>> {
        self.store.delete(&self.key)
    }

    pub fn fetch<F>(&self, f: F) -> CacheResult<Snapshot<Maybe<V>>>
    where
        F: FnOnce() -> Option<V>,
    {
        self.store.fetch_with(&self.key, f)
    }

    pub fn try_fetch<F, E>(&self, f: F) -> CacheResult<Snapshot<Maybe<V>>>
    where
        F: FnOnce() -> Result<Option<V>, E>,
        E: Into<BoxError>,
    {
        self.store.try_fetch_with(&self.key, f)
    }

    /// Read-modify-write. `Some` is written back; `Nothing` deletes the key.
    /// The returned snapshot has source `updated` either way.
    ///
    /// Not atomic: a concurrent writer between the read and the write loses.
    pub fn update<F>(&self, f: F) -> CacheResult<Snapshot<Maybe<V>>>
    where
        F: FnOnce(Maybe<V>) -> Maybe<V>,
    {
        self.read().bind(|current| match f(current.into_value()) {
            Maybe::Some(value) => self
                .store
                .write(&self.key, value)
                .map(|written| written.map(Maybe::Some)),
            Maybe::Nothing => self
                .store
                .delete(&self.key)
                .map(|_| Snapshot::updated(self.key.clone(), Maybe::Nothing)),
        })
    }

    /// Returns the cached value, computing and storing it if absent. Compute
    /// failures are reported as a `compute_if_absent` [`StoreError`] whose
    /// cause is the underlying `fetch` error.
    pub fn compute_if_absent<F, E>(&self, f: F) -> CacheResult<Snapshot<V>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxError>,
    {
        self.store
            .try_fetch_with(&self.key, || f().map(Some))
            .map_left(|err| match err {
                CacheError::Store(inner) => {
                    let message = format!(
                        "compute_if_absent failed for key '{}': {}",
                        self.key,
                        inner.message()
                    );
                    CacheError::from(
                        StoreError::new("compute_if_absent", self.key.to_string(), message)
                            .with_cause(inner),
                    )
                },
                other => other,
            })
            .bind(|snapshot| snapshot.bind(|value| self.require(value)))
    }

    /// Whether a live value is stored.
    pub fn is_present(&self) -> bool {
        self.store.contains_key(&self.key)
    }

    pub fn is_empty(&self) -> bool {
        !self.is_present()
    }

    /// The stored value, or `default` when absent or on error.
    pub fn value_or(&self, default: V) -> V {
        match self.read() {
            Either::Right(snapshot) => snapshot.into_value().value_or(default),
            Either::Left(_) => default,
        }
    }

    /// The stored value; absence is a [`CacheMissError`].
    pub fn value(&self) -> CacheResult<V> {
        self.read().bind(|snapshot| self.require(snapshot.into_value()))
    }

    /// The stored value, with errors folded into `Nothing`.
    pub fn value_maybe(&self) -> Maybe<V> {
        self.read().fold(|_| Maybe::Nothing, Snapshot::into_value)
    }

    pub fn map<R, F>(&self, f: F) -> CacheResult<Maybe<R>>
    where
        F: FnOnce(V) -> R,
    {
        self.read().map(|snapshot| snapshot.into_value().map(f))
    }

    /// Chains a fallible step over the stored value, keeping the read's
    /// snapshot metadata. An absent value skips `f`.
    pub fn bind<R, F>(&self, f: F) -> CacheResult<Snapshot<Maybe<R>>>
    where
        F: FnOnce(V) -> CacheResult<R>,
    {
        self.read().bind(|snapshot| {
            snapshot.bind(|value| match value {
                Maybe::Some(value) => f(value).map(Maybe::Some),
                Maybe::Nothing => Either::Right(Maybe::Nothing),
            })
        })
    }

    /// Alias of [`bind`](Self::bind).
    pub fn flat_map<R, F>(&self, f: F) -> CacheResult<Snapshot<Maybe<R>>>
    where
        F: FnOnce(V) -> CacheResult<R>,
    {
        self.bind(f)
    }

    /// Eliminates the read result into one type.
    pub fn fold<T>(
        &self,
        on_error: impl FnOnce(CacheError) -> T,
        on_snapshot: impl FnOnce(Snapshot<Maybe<V>>) -> T,
    ) -> T {
        self.read().fold(on_error, on_snapshot)
    }

    pub fn with_snapshot<R, F>(&self, f: F) -> CacheResult<R>
    where
        F: FnOnce(Snapshot<Maybe<V>>) -> R,
    {
        self.read().map(f)
    }

    /// Like [`with_snapshot`](Self::with_snapshot) but drops the metadata.
    pub fn with<R, F>(&self, f: F) -> CacheResult<R>
    where
        F: FnOnce(Maybe<V>) -> R,
    {
        self.read().map(|snapshot| f(snapshot.into_value()))
    }

    /// Another key in the same store and namespace.
    pub fn with_key(&self, key: &str) -> Self {
        Self::new(Arc::clone(&self.store), self.store.key(key))
    }

    /// A ref one level below this key: the store is rescoped under the
    /// current raw key and `scope_key` is bound there.
    pub fn scope(&self, scope_key: &str) -> Self {
        let namespace = self.store.namespace().nested(self.key.key());
        let key = namespace.key(scope_key);
        Self::new(self.store.rescope(namespace), key)
    }

    fn require(&self, value: Maybe<V>) -> CacheResult<V> {
        match value {
            Maybe::Some(value) => Either::Right(value),
            Maybe::Nothing => Either::Left(CacheMissError::new(self.key.clone()).into()),
        }
    }
}

impl<V> Clone for CacheRef<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
        }
    }
}

impl<V> fmt::Debug for CacheRef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRef")
            .field("store", &self.store.store_type())
            .field("key", &self.key)
            .finish()
    }
}
