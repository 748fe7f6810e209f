//! Store decorators.
//!
//! A decorator wraps a [`SharedStore`] of the same value type and sees every
//! store operation go by. [`DecoratedStore`] is the one forwarding
//! implementation: it lists each operation of the contract explicitly and
//! routes it through [`Decorator::around`], so a decorator only writes the
//! behavior it adds.
//!
//! ```text
//!   caller ──► DecoratedStore::fetch(k)
//!                │ Call { fetch, "app:k", "app", "memory" }
//!                ▼
//!              Decorator::around(call, outcome::lookup, proceed)
//!                │                                     │
//!                │ before                              ▼
//!                │                        inner.fetch(k, compute)
//!                │ after (sees &result)                │
//!                ▼                                     │
//!   caller ◄──── result (unchanged) ◄──────────────────┘
//! ```
//!
//! Batch operations report one [`Call`] whose key is the rendered keys
//! joined with `_`; `clear` reports the key `all`.

pub mod instrumented;
pub mod outcome;

use std::fmt;
use std::sync::Arc;

use crate::algebra::Maybe;
use crate::error::CacheResult;
use crate::key::CacheKey;
use crate::namespace::Namespace;
use crate::snapshot::Snapshot;
use crate::traits::{BatchCompute, Compute, SharedStore, SnapshotMap, Store};

pub use instrumented::Instrumented;
pub use outcome::{OutcomeFields, OutcomeFn};

/// Store contract operations, as reported to decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Delete,
    ContainsKey,
    Clear,
    Fetch,
    ReadAll,
    WriteAll,
    FetchAll,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Read,
        Operation::Write,
        Operation::Delete,
        Operation::ContainsKey,
        Operation::Clear,
        Operation::Fetch,
        Operation::ReadAll,
        Operation::WriteAll,
        Operation::FetchAll,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::ContainsKey => "contains_key",
            Operation::Clear => "clear",
            Operation::Fetch => "fetch",
            Operation::ReadAll => "read_all",
            Operation::WriteAll => "write_all",
            Operation::FetchAll => "fetch_all",
        }
    }

    pub fn is_batch(self) -> bool {
        matches!(self, Operation::ReadAll | Operation::WriteAll | Operation::FetchAll)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one in-flight store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub key: String,
    pub namespace: String,
    /// `store_type()` of the wrapped store.
    pub store_type: String,
}

/// Behavior layered around a store.
///
/// `around` must call `proceed` exactly once and return its result as is.
pub trait Decorator: Send + Sync + 'static {
    /// Registry name; also used in `store_type()`.
    fn name(&self) -> &str;

    fn around<R, F>(&self, call: &Call, outcome: OutcomeFn<R>, proceed: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _ = (call, outcome);
        proceed()
    }
}

/// A [`Store`] that forwards every operation to `inner` through a
/// [`Decorator`].
pub struct DecoratedStore<V, D> {
    inner: SharedStore<V>,
    decorator: Arc<D>,
}

impl<V, D> DecoratedStore<V, D>
where
    V: 'static,
    D: Decorator,
{
    pub fn new(inner: SharedStore<V>, decorator: D) -> Self {
        Self::with_shared(inner, Arc::new(decorator))
    }

    /// Wraps with a decorator instance that other stores may also use.
    pub fn with_shared(inner: SharedStore<V>, decorator: Arc<D>) -> Self {
        Self { inner, decorator }
    }

    pub fn inner(&self) -> &SharedStore<V> {
        &self.inner
    }

    pub fn decorator(&self) -> &D {
        &self.decorator
    }

    pub fn into_shared(self) -> SharedStore<V> {
        Arc::new(self)
    }

    fn call(&self, operation: Operation, key: String) -> Call {
        Call {
            operation,
            key,
            namespace: self.inner.namespace().to_string(),
            store_type: self.inner.store_type(),
        }
    }
}

fn batch_key<'a>(keys: impl IntoIterator<Item = &'a CacheKey>) -> String {
    keys.into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("_")
}

impl<V, D> Store<V> for DecoratedStore<V, D>
where
    V: 'static,
    D: Decorator,
{
    fn namespace(&self) -> &Namespace {
        self.inner.namespace()
    }

    fn store_type(&self) -> String {
        format!("{}({})", self.decorator.name(), self.inner.store_type())
    }

    fn read(&self, key: &CacheKey) -> CacheResult<Snapshot<Maybe<V>>> {
        let call = self.call(Operation::Read, key.to_string());
        self.decorator
            .around(&call, outcome::lookup, || self.inner.read(key))
    }

    fn write(&self, key: &CacheKey, value: V) -> CacheResult<Snapshot<V>> {
        let call = self.call(Operation::Write, key.to_string());
        self.decorator
            .around(&call, outcome::write, || self.inner.write(key, value))
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<Maybe<V>> {
        let call = self.call(Operation::Delete, key.to_string());
        self.decorator
            .around(&call, outcome::delete, || self.inner.delete(key))
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        let call = self.call(Operation::ContainsKey, key.to_string());
        self.decorator
            .around(&call, outcome::presence, || self.inner.contains_key(key))
    }

    fn clear(&self) -> CacheResult<()> {
        let call = self.call(Operation::Clear, "all".to_string());
        self.decorator
            .around(&call, outcome::clear, || self.inner.clear())
    }

    fn fetch(
        &self,
        key: &CacheKey,
        compute: &mut Compute<'_, V>,
    ) -> CacheResult<Snapshot<Maybe<V>>> {
        let call = self.call(Operation::Fetch, key.to_string());
        self.decorator
            .around(&call, outcome::lookup, || self.inner.fetch(key, compute))
    }

    fn read_all(&self, keys: &[CacheKey]) -> CacheResult<SnapshotMap<Maybe<V>>> {
        let call = self.call(Operation::ReadAll, batch_key(keys));
        self.decorator
            .around(&call, outcome::batch_lookup, || self.inner.read_all(keys))
    }

    fn write_all(&self, entries: Vec<(CacheKey, V)>) -> CacheResult<SnapshotMap<V>> {
        let call = self.call(Operation::WriteAll, batch_key(entries.iter().map(|(k, _)| k)));
        self.decorator
            .around(&call, outcome::batch_write, || self.inner.write_all(entries))
    }

    fn fetch_all(
        &self,
        keys: &[CacheKey],
        compute: &mut BatchCompute<'_, V>,
    ) -> CacheResult<SnapshotMap<Maybe<V>>> {
        let call = self.call(Operation::FetchAll, batch_key(keys));
        self.decorator
            .around(&call, outcome::batch_lookup, || self.inner.fetch_all(keys, compute))
    }

    fn rescope(&self, namespace: Namespace) -> SharedStore<V> {
        Arc::new(Self {
            inner: self.inner.rescope(namespace),
            decorator: Arc::clone(&self.decorator),
        })
    }
}

impl<V, D> fmt::Debug for DecoratedStore<V, D>
where
    V: 'static,
    D: Decorator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratedStore")
            .field("store_type", &self.store_type())
            .field("namespace", self.namespace())
            .finish()
    }
}
