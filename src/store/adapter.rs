//! Backend over an external key-value cache.
//!
//! [`CacheAdapter`] is the interface a persistent or out-of-process cache
//! client has to offer. [`AdapterBackend`] turns one into a [`Store`]: keys
//! are passed fully rendered (`namespace:key`), and every adapter error or
//! panic is caught at the boundary and returned as a
//! [`StoreError`](crate::error::StoreError) naming the failed operation.
//!
//! `clear` only removes this backend's namespace, via
//! `delete_matched("<namespace><delimiter>*")`. At the root namespace it falls
//! back to the adapter's own `clear`.
//!
//! Unlike the memory backend, `fetch` does not serialize concurrent
//! computations for the same key; the adapter owns its consistency model.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::algebra::{Either, Maybe};
use crate::error::{BoxError, CacheError, CacheResult, StoreError};
use crate::instrument::panic_message;
use crate::key::CacheKey;
use crate::namespace::Namespace;
use crate::registry::BackendArgs;
use crate::snapshot::Snapshot;
use crate::traits::{Compute, SharedStore, SnapshotMap, Store};

/// Per-write options forwarded to the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Entry lifetime; `None` leaves it to the adapter.
    pub expires_in: Option<Duration>,
}

/// Interface of an external cache client.
pub trait CacheAdapter<V>: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<V>, BoxError>;

    /// Returns `false` if the adapter declined the write.
    fn write(&self, key: &str, value: &V, options: &WriteOptions) -> Result<bool, BoxError>;

    /// Values for the keys that are present. Missing keys are omitted.
    fn read_multi(&self, keys: &[String]) -> Result<FxHashMap<String, V>, BoxError>;

    fn write_multi(
        &self,
        entries: &[(String, V)],
        options: &WriteOptions,
    ) -> Result<bool, BoxError>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool, BoxError>;

    fn exist(&self, key: &str) -> Result<bool, BoxError>;

    fn clear(&self) -> Result<(), BoxError>;

    /// Deletes keys matching a glob-style pattern (`*` wildcard). Returns the
    /// number removed.
    fn delete_matched(&self, pattern: &str) -> Result<usize, BoxError>;
}

fn adapter_error(operation: &str, key: &str, err: BoxError) -> CacheError {
    let message = format!("Adapter {operation} failed: {err}");
    StoreError::new(operation, key, message).with_boxed_cause(err).into()
}

/// [`Store`] over a [`CacheAdapter`].
pub struct AdapterBackend<V, A> {
    namespace: Namespace,
    adapter: Arc<A>,
    options: WriteOptions,
    _marker: PhantomData<fn() -> V>,
}

impl<V, A> AdapterBackend<V, A>
where
    V: Clone + Send + Sync + 'static,
    A: CacheAdapter<V> + 'static,
{
    pub fn new(namespace: Namespace, adapter: Arc<A>) -> Self {
        Self::with_options(namespace, adapter, WriteOptions::default())
    }

    pub fn with_options(namespace: Namespace, adapter: Arc<A>, options: WriteOptions) -> Self {
        Self {
            namespace,
            adapter,
            options,
            _marker: PhantomData,
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn write_options(&self) -> WriteOptions {
        self.options
    }

    pub fn into_shared(self) -> SharedStore<V> {
        Arc::new(self)
    }

    /// Backend registry factory over one adapter. Honors the `expires_in`
    /// duration option.
    pub fn factory(
        adapter: Arc<A>,
    ) -> impl Fn(&BackendArgs) -> Result<SharedStore<V>, BoxError> + Send + Sync + 'static {
        move |args: &BackendArgs| {
            let options = WriteOptions {
                expires_in: args.options.duration("expires_in")?,
            };
            let backend =
                Self::with_options(args.namespace.clone(), Arc::clone(&adapter), options);
            Ok(backend.into_shared())
        }
    }

    /// Runs one adapter call. A panic comes back as an error.
    fn call<T>(&self, f: impl FnOnce(&A) -> Result<T, BoxError>) -> Result<T, BoxError> {
        panic::catch_unwind(AssertUnwindSafe(|| f(&self.adapter))).unwrap_or_else(|payload| {
            Err(format!("adapter {}", panic_message(payload.as_ref())).into())
        })
    }

    fn store_write(&self, key: &CacheKey, value: &V) -> Result<(), CacheError> {
        let rendered = key.to_string();
        match self.call(|adapter| adapter.write(&rendered, value, &self.options)) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::new("write", rendered, "Adapter rejected write").into()),
            Err(err) => Err(adapter_error("write", &rendered, err)),
        }
    }
}

impl<V, A> Clone for AdapterBackend<V, A> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            adapter: Arc::clone(&self.adapter),
            options: self.options,
            _marker: PhantomData,
        }
    }
}

impl<V, A> fmt::Debug for AdapterBackend<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterBackend")
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<V, A> Store<V> for AdapterBackend<V, A>
where
    V: Clone + Send + Sync + 'static,
    A: CacheAdapter<V> + 'static,
{
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn store_type(&self) -> String {
        "adapter".to_string()
    }

    fn read(&self, key: &CacheKey) -> CacheResult<Snapshot<Maybe<V>>> {
        let rendered = key.to_string();
        match self.call(|adapter| adapter.read(&rendered)) {
            Ok(value) => Either::Right(Snapshot::cached(key.clone(), Maybe::wrap(value))),
            Err(err) => Either::Left(adapter_error("read", &rendered, err)),
        }
    }

    fn write(&self, key: &CacheKey, value: V) -> CacheResult<Snapshot<V>> {
        match self.store_write(key, &value) {
            Ok(()) => Either::Right(Snapshot::updated(key.clone(), value)),
            Err(err) => Either::Left(err),
        }
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<Maybe<V>> {
        let rendered = key.to_string();
        let prior = match self.call(|adapter| adapter.read(&rendered)) {
            Ok(prior) => prior,
            Err(err) => return Either::Left(adapter_error("delete", &rendered, err)),
        };
        match self.call(|adapter| adapter.delete(&rendered)) {
            Ok(_) => Either::Right(Maybe::wrap(prior)),
            Err(err) => Either::Left(adapter_error("delete", &rendered, err)),
        }
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        let rendered = key.to_string();
        match self.call(|adapter| adapter.exist(&rendered)) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(key = %rendered, error = %err, "adapter exist check failed");
                false
            },
        }
    }

    fn clear(&self) -> CacheResult<()> {
        let result = if self.namespace.is_root() {
            self.call(|adapter| adapter.clear())
        } else {
            let pattern = format!("{}{}*", self.namespace, self.namespace.delimiter());
            self.call(|adapter| adapter.delete_matched(&pattern)).map(|_| ())
        };
        match result {
            Ok(()) => Either::Right(()),
            Err(err) => Either::Left(adapter_error("clear", "all", err)),
        }
    }

    fn fetch(
        &self,
        key: &CacheKey,
        compute: &mut Compute<'_, V>,
    ) -> CacheResult<Snapshot<Maybe<V>>> {
        let rendered = key.to_string();
        match self.call(|adapter| adapter.read(&rendered)) {
            Ok(Some(value)) => {
                return Either::Right(Snapshot::cached(key.clone(), Maybe::Some(value)));
            },
            Ok(None) => {},
            Err(err) => return Either::Left(adapter_error("fetch", &rendered, err)),
        }
        match compute() {
            Ok(Some(value)) => match self.store_write(key, &value) {
                Ok(()) => Either::Right(Snapshot::computed(key.clone(), Maybe::Some(value))),
                Err(err) => Either::Left(err),
            },
            Ok(None) => Either::Right(Snapshot::computed(key.clone(), Maybe::Nothing)),
            Err(err) => {
                let message = format!("Failed to compute value for key '{rendered}': {err}");
                let err = StoreError::new("fetch", rendered, message).with_boxed_cause(err);
                Either::Left(err.into())
            },
        }
    }

    fn read_all(&self, keys: &[CacheKey]) -> CacheResult<SnapshotMap<Maybe<V>>> {
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let mut found = match self.call(|adapter| adapter.read_multi(&rendered)) {
            Ok(found) => found,
            Err(err) => return Either::Left(adapter_error("read_all", &rendered.join("_"), err)),
        };
        let out = keys
            .iter()
            .zip(&rendered)
            .map(|(key, name)| {
                let value = Maybe::wrap(found.remove(name));
                (key.clone(), Snapshot::cached(key.clone(), value))
            })
            .collect();
        Either::Right(out)
    }

    fn write_all(&self, entries: Vec<(CacheKey, V)>) -> CacheResult<SnapshotMap<V>> {
        let rendered: Vec<(String, V)> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        let joined = || {
            rendered
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join("_")
        };
        match self.call(|adapter| adapter.write_multi(&rendered, &self.options)) {
            Ok(true) => {},
            Ok(false) => {
                let err = StoreError::new("write_all", joined(), "Adapter rejected write");
                return Either::Left(err.into());
            },
            Err(err) => return Either::Left(adapter_error("write_all", &joined(), err)),
        }
        let out = entries
            .into_iter()
            .map(|(key, value)| (key.clone(), Snapshot::updated(key, value)))
            .collect();
        Either::Right(out)
    }

    fn rescope(&self, namespace: Namespace) -> SharedStore<V> {
        Arc::new(Self {
            namespace,
            ..self.clone()
        })
    }
}
