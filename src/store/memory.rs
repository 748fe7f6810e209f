//! In-memory TTL backend.
//!
//! [`MemoryBackend`] is a namespace-scoped view over a [`MemoryTable`]. The
//! table is either private to one backend (and every store rescoped from it)
//! or the process-wide table for `V`, in which case backends built
//! independently under different namespaces see one physical map but stay
//! logically isolated.
//!
//! ## Expiration
//!
//! Each write stamps `expires_at = now + ttl`. A TTL too large to add to the
//! clock's current instant means the entry never expires. Reads,
//! `contains_key` and `fetch` treat `now >= expires_at` as absent; `read` and
//! `fetch` also evict the entry. A zero TTL therefore stores an entry that is
//! already expired. [`size`](MemoryBackend::size) and [`keys`](MemoryBackend::keys)
//! are the only calls that sweep, and only this backend's namespace.
//!
//! ## Fetch
//!
//! ```text
//!   fetch(k)
//!     │ lookup ── hit ──────────────────────────────► cached
//!     │ miss
//!     ▼
//!   lock_key(k)            (other fetchers of k wait here)
//!     │ lookup ── hit ──────────────────────────────► cached
//!     │ miss
//!     ▼
//!   compute() ── Some(v) ── insert ─────────────────► computed Some(v)
//!             ── None ──────────────────────────────► computed Nothing
//!             ── Err ───────────────────────────────► Left(StoreError "fetch")
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use typed_cache::clock::ManualClock;
//! use typed_cache::prelude::*;
//! use typed_cache::store::{MemoryBackend, MemoryOptions};
//!
//! let clock = Arc::new(ManualClock::new());
//! let backend = MemoryBackend::<u32>::with_options(
//!     Namespace::at(["sessions"]),
//!     MemoryOptions::default().with_ttl(Duration::from_secs(10)),
//! )
//! .with_clock(clock.clone());
//!
//! backend.set("s1", 7).right_or_raise();
//! clock.advance(Duration::from_secs(10));
//! assert!(backend.get("s1").right_or_raise().value().is_nothing());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::algebra::{Either, Maybe};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheResult, StoreError};
use crate::key::CacheKey;
use crate::namespace::Namespace;
use crate::snapshot::Snapshot;
use crate::store::metrics::BackendMetrics;
use crate::store::table::{Lookup, MemoryTable};
use crate::traits::{Compute, SharedStore, Store};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Construction options for [`MemoryBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Use the process-wide table for the value type.
    pub shared: bool,
    pub ttl: Duration,
}

impl MemoryOptions {
    pub fn shared() -> Self {
        Self {
            shared: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            shared: false,
            ttl: DEFAULT_TTL,
        }
    }
}

/// TTL cache backend over a sharded concurrent table.
pub struct MemoryBackend<V> {
    namespace: Namespace,
    ttl: Duration,
    table: Arc<MemoryTable<V>>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryBackend<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Private table, default TTL.
    pub fn new(namespace: Namespace) -> Self {
        Self::with_options(namespace, MemoryOptions::default())
    }

    pub fn with_options(namespace: Namespace, options: MemoryOptions) -> Self {
        let table = if options.shared {
            MemoryTable::shared()
        } else {
            Arc::new(MemoryTable::new())
        };
        Self::with_table(namespace, table, options.ttl)
    }

    /// Builds a backend over an explicit table handle.
    pub fn with_table(namespace: Namespace, table: Arc<MemoryTable<V>>, ttl: Duration) -> Self {
        Self {
            namespace,
            ttl,
            table,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source. Stores rescoped afterwards inherit it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_shared(&self) -> bool {
        self.table.is_shared()
    }

    pub fn table(&self) -> &Arc<MemoryTable<V>> {
        &self.table
    }

    /// Writes with a per-entry TTL instead of the backend default.
    pub fn write_with_ttl(
        &self,
        key: &CacheKey,
        value: V,
        ttl: Duration,
    ) -> CacheResult<Snapshot<V>> {
        self.table.insert(key.clone(), value.clone(), self.deadline(ttl));
        self.table.counters.inc_write();
        Either::Right(Snapshot::updated(key.clone(), value))
    }

    /// Live entries in this namespace. Purges expired ones first.
    pub fn size(&self) -> usize {
        self.table.purge_expired(&self.namespace, self.clock.now());
        self.table.len_in(&self.namespace)
    }

    /// Live keys in this namespace, sorted. Purges expired ones first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.table.purge_expired(&self.namespace, self.clock.now());
        self.table.keys_in(&self.namespace)
    }

    /// Counters for the underlying table (shared by every store over it).
    pub fn metrics(&self) -> BackendMetrics {
        self.table.counters.snapshot()
    }

    pub fn into_shared(self) -> SharedStore<V> {
        Arc::new(self)
    }

    fn lookup(&self, key: &CacheKey) -> Lookup<V> {
        self.table.lookup(key, self.clock.now())
    }

    /// `None` when `now + ttl` is not representable.
    fn deadline(&self, ttl: Duration) -> Option<Instant> {
        self.clock.now().checked_add(ttl)
    }
}

impl<V> Clone for MemoryBackend<V> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            ttl: self.ttl,
            table: Arc::clone(&self.table),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V> fmt::Debug for MemoryBackend<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("shared", &self.table.is_shared())
            .finish()
    }
}

impl<V> Store<V> for MemoryBackend<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn store_type(&self) -> String {
        "memory".to_string()
    }

    fn read(&self, key: &CacheKey) -> CacheResult<Snapshot<Maybe<V>>> {
        let value = match self.lookup(key) {
            Lookup::Hit(value) => {
                self.table.counters.inc_hit();
                Maybe::Some(value)
            },
            Lookup::Miss | Lookup::Expired => {
                self.table.counters.inc_miss();
                Maybe::Nothing
            },
        };
        Either::Right(Snapshot::cached(key.clone(), value))
    }

    fn write(&self, key: &CacheKey, value: V) -> CacheResult<Snapshot<V>> {
        self.write_with_ttl(key, value, self.ttl)
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<Maybe<V>> {
        let prior = self.table.remove(key);
        if prior.is_some() {
            self.table.counters.inc_delete();
        }
        Either::Right(Maybe::wrap(prior))
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.table.contains_live(key, self.clock.now())
    }

    fn clear(&self) -> CacheResult<()> {
        let removed = self.table.clear_namespace(&self.namespace);
        debug!(
            namespace = %self.namespace,
            removed,
            shared = self.table.is_shared(),
            "cleared namespace"
        );
        Either::Right(())
    }

    fn fetch(
        &self,
        key: &CacheKey,
        compute: &mut Compute<'_, V>,
    ) -> CacheResult<Snapshot<Maybe<V>>> {
        if let Lookup::Hit(value) = self.lookup(key) {
            self.table.counters.inc_hit();
            return Either::Right(Snapshot::cached(key.clone(), Maybe::Some(value)));
        }

        let _guard = self.table.lock_key(key);
        if let Lookup::Hit(value) = self.lookup(key) {
            self.table.counters.inc_hit();
            return Either::Right(Snapshot::cached(key.clone(), Maybe::Some(value)));
        }
        self.table.counters.inc_miss();

        self.table.counters.inc_compute();
        match compute() {
            Ok(Some(value)) => {
                self.table.insert(key.clone(), value.clone(), self.deadline(self.ttl));
                self.table.counters.inc_write();
                Either::Right(Snapshot::computed(key.clone(), Maybe::Some(value)))
            },
            Ok(None) => Either::Right(Snapshot::computed(key.clone(), Maybe::Nothing)),
            Err(err) => {
                let message = format!("Failed to compute value for key '{key}': {err}");
                Either::Left(
                    StoreError::new("fetch", key.to_string(), message)
                        .with_boxed_cause(err)
                        .into(),
                )
            },
        }
    }

    fn rescope(&self, namespace: Namespace) -> SharedStore<V> {
        Arc::new(Self {
            namespace,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::BoxError;
    use crate::snapshot::Source;
    use crate::traits::StoreExt;

    fn backend_with_clock(ttl: u64) -> (MemoryBackend<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let backend = MemoryBackend::with_options(
            Namespace::root().nested("test"),
            MemoryOptions::default().with_ttl(Duration::from_secs(ttl)),
        )
        .with_clock(clock.clone());
        (backend, clock)
    }

    #[test]
    fn write_then_read_is_cached() {
        let backend = MemoryBackend::new(Namespace::root().nested("test"));
        let written = backend.set("a", "v".to_string()).right_or_raise();
        assert_eq!(written.source(), Source::Updated);

        let read = backend.get("a").right_or_raise();
        assert_eq!(read.source(), Source::Cached);
        assert_eq!(read.value(), &Maybe::Some("v".to_string()));
    }

    #[test]
    fn read_of_unknown_key_is_nothing_not_error() {
        let backend = MemoryBackend::<String>::new(Namespace::root());
        let read = backend.get("never");
        assert!(read.is_right());
        assert!(read.right_or_raise().value().is_nothing());
        assert_eq!(backend.metrics().misses, 1);
    }

    #[test]
    fn ttl_visibility_and_lazy_eviction() {
        let (backend, clock) = backend_with_clock(10);
        backend.set("k", "v".to_string()).right_or_raise();

        clock.advance(Duration::from_secs(9));
        assert_eq!(backend.get("k").right_or_raise().into_value(), Maybe::Some("v".to_string()));

        clock.advance(Duration::from_secs(2));
        assert_eq!(backend.table().raw_len(), 1);
        assert!(backend.get("k").right_or_raise().value().is_nothing());
        assert_eq!(backend.table().raw_len(), 0);
        assert_eq!(backend.metrics().expirations, 1);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let (backend, clock) = backend_with_clock(10);
        backend.set("k", "v".to_string()).right_or_raise();
        clock.advance(Duration::from_secs(10));
        assert!(!backend.has("k"));
    }

    #[test]
    fn contains_key_respects_expiry() {
        let (backend, clock) = backend_with_clock(5);
        assert!(!backend.has("k"));
        backend.set("k", "v".to_string()).right_or_raise();
        assert!(backend.has("k"));
        clock.advance(Duration::from_secs(6));
        assert!(!backend.has("k"));
    }

    #[test]
    fn delete_returns_prior_value_even_if_expired() {
        let (backend, clock) = backend_with_clock(1);
        backend.set("k", "v".to_string()).right_or_raise();
        clock.advance(Duration::from_secs(5));
        assert_eq!(backend.remove("k").right_or_raise(), Maybe::Some("v".to_string()));
        assert_eq!(backend.remove("k").right_or_raise(), Maybe::Nothing);
    }

    #[test]
    fn write_with_ttl_overrides_default() {
        let (backend, clock) = backend_with_clock(600);
        let key = backend.key("short");
        backend.write_with_ttl(&key, "v".to_string(), Duration::from_secs(1)).right_or_raise();
        clock.advance(Duration::from_secs(1));
        assert!(backend.read(&key).right_or_raise().value().is_nothing());
    }

    #[test]
    fn zero_ttl_entry_is_expired_on_arrival() {
        let (backend, _clock) = backend_with_clock(0);
        let written = backend.set("k", "v".to_string()).right_or_raise();
        assert_eq!(written.source(), Source::Updated);
        assert!(!backend.has("k"));
        assert!(backend.get("k").right_or_raise().value().is_nothing());
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let clock = Arc::new(ManualClock::new());
        let backend = MemoryBackend::with_options(
            Namespace::root().nested("forever"),
            MemoryOptions::default().with_ttl(Duration::MAX),
        )
        .with_clock(clock.clone());

        backend.set("k", 1u8).right_or_raise();
        let key = backend.key("f");
        backend.write_with_ttl(&key, 2, Duration::MAX).right_or_raise();
        assert!(backend.fetch_with("g", || Some(3)).right_or_raise().is_computed());

        clock.advance(Duration::from_secs(100 * 365 * 24 * 3600));
        assert_eq!(backend.get("k").right_or_raise().into_value(), Maybe::Some(1));
        assert!(backend.read(&key).right_or_raise().value().is_some());
        assert!(backend.fetch_with("g", || Some(4)).right_or_raise().is_cached());
        assert_eq!(backend.size(), 3);
    }

    #[test]
    fn fetch_counts_one_hit_or_miss_per_call() {
        let backend = MemoryBackend::<u8>::new(Namespace::root().nested("counts"));
        backend.fetch_with("k", || Some(1)).right_or_raise();
        backend.fetch_with("k", || Some(2)).right_or_raise();
        let metrics = backend.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 1);
    }

    #[test]
    fn fetch_computes_once_then_hits() {
        let backend = MemoryBackend::new(Namespace::root().nested("test"));
        let calls = AtomicUsize::new(0);

        let first = backend
            .fetch_with("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Some("computed".to_string())
            })
            .right_or_raise();
        assert_eq!(first.source(), Source::Computed);

        let second = backend
            .fetch_with("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Some("other".to_string())
            })
            .right_or_raise();
        assert_eq!(second.source(), Source::Cached);
        assert_eq!(second.into_value(), Maybe::Some("computed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.metrics().computes, 1);
    }

    #[test]
    fn fetch_none_is_not_stored() {
        let backend = MemoryBackend::<String>::new(Namespace::root());
        let snapshot = backend.fetch_with("k", || None).right_or_raise();
        assert!(snapshot.is_computed());
        assert!(snapshot.value().is_nothing());
        assert!(!backend.has("k"));
    }

    #[test]
    fn fetch_error_becomes_store_error() {
        let backend = MemoryBackend::<String>::new(Namespace::root().nested("test"));
        let err = backend
            .try_fetch_with("boom", || Err::<Option<String>, BoxError>("backend down".into()))
            .left()
            .unwrap();
        match err {
            crate::error::CacheError::Store(store_err) => {
                assert_eq!(store_err.operation(), "fetch");
                assert_eq!(store_err.key(), "test:boom");
                assert!(store_err.has_cause());
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.table().raw_len(), 0);
    }

    #[test]
    fn size_and_keys_purge_expired() {
        let (backend, clock) = backend_with_clock(10);
        backend.set("a", "1".to_string()).right_or_raise();
        clock.advance(Duration::from_secs(5));
        backend.set("b", "2".to_string()).right_or_raise();
        clock.advance(Duration::from_secs(6));

        assert_eq!(backend.size(), 1);
        assert_eq!(backend.keys(), vec![backend.key("b")]);
        assert_eq!(backend.table().raw_len(), 1);
    }

    #[test]
    fn rescoped_stores_share_private_table() {
        let backend = MemoryBackend::new(Namespace::root().nested("app"));
        let users = backend.with_namespace("users".into());
        let posts = backend.with_namespace("posts".into());

        users.set("1", "alice".to_string()).right_or_raise();
        posts.set("1", "hello".to_string()).right_or_raise();
        assert_eq!(users.namespace().as_str(), "app:users");
        assert_eq!(backend.table().raw_len(), 2);

        users.clear().right_or_raise();
        assert!(!users.has("1"));
        assert!(posts.has("1"));
    }

    #[test]
    fn clear_on_private_backend_removes_its_entries() {
        let backend = MemoryBackend::new(Namespace::root().nested("t"));
        backend.set_many([("a", 1u8), ("b", 2)]).right_or_raise();
        backend.clear().right_or_raise();
        assert_eq!(backend.size(), 0);
    }

    #[test]
    fn batch_operations() {
        let backend = MemoryBackend::new(Namespace::root().nested("batch"));
        backend.set("hit", 1u32).right_or_raise();

        let fetched = backend
            .fetch_all_with(["hit", "miss"], |_| Some(2))
            .right_or_raise();
        assert!(fetched[&backend.key("hit")].is_cached());
        assert!(fetched[&backend.key("miss")].is_computed());

        let read = backend.get_many(["hit", "miss", "none"]).right_or_raise();
        assert_eq!(read.len(), 3);
        assert!(read[&backend.key("none")].value().is_nothing());
    }
}
