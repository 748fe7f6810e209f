//! Immutable value envelope returned by store operations.
//!
//! A [`Snapshot`] records which key a value belongs to, where it came from
//! ([`Source`]) and when it was retrieved. `map` and `bind` transform the
//! value while keeping the key, source and timestamp.

use std::fmt;
use std::time::{Duration, Instant};

use crate::algebra::Either;
use crate::key::CacheKey;

/// Provenance of a snapshot's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Served from the cache.
    Cached,
    /// Produced by a fetch computation.
    Computed,
    /// Written by the caller.
    Updated,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Computed => "computed",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value plus its key, provenance and retrieval time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<V> {
    key: CacheKey,
    value: V,
    source: Source,
    retrieved_at: Instant,
}

impl<V> Snapshot<V> {
    pub fn new(key: CacheKey, value: V, source: Source, retrieved_at: Instant) -> Self {
        Self {
            key,
            value,
            source,
            retrieved_at,
        }
    }

    pub fn cached(key: CacheKey, value: V) -> Self {
        Self::new(key, value, Source::Cached, Instant::now())
    }

    pub fn computed(key: CacheKey, value: V) -> Self {
        Self::new(key, value, Source::Computed, Instant::now())
    }

    pub fn updated(key: CacheKey, value: V) -> Self {
        Self::new(key, value, Source::Updated, Instant::now())
    }

    #[inline]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn source(&self) -> Source {
        self.source
    }

    #[inline]
    pub fn retrieved_at(&self) -> Instant {
        self.retrieved_at
    }

    /// Time elapsed since retrieval.
    pub fn age(&self) -> Duration {
        self.retrieved_at.elapsed()
    }

    /// Age relative to an explicit instant. Saturates at zero.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.retrieved_at)
    }

    pub fn is_cached(&self) -> bool {
        self.source == Source::Cached
    }

    pub fn is_computed(&self) -> bool {
        self.source == Source::Computed
    }

    pub fn is_updated(&self) -> bool {
        self.source == Source::Updated
    }

    pub fn map<R>(self, f: impl FnOnce(V) -> R) -> Snapshot<R> {
        Snapshot {
            key: self.key,
            value: f(self.value),
            source: self.source,
            retrieved_at: self.retrieved_at,
        }
    }

    /// Like `map`, but the transformation may fail.
    pub fn bind<E, R>(self, f: impl FnOnce(V) -> Either<E, R>) -> Either<E, Snapshot<R>> {
        let Self {
            key,
            value,
            source,
            retrieved_at,
        } = self;
        f(value).map(|value| Snapshot {
            key,
            value,
            source,
            retrieved_at,
        })
    }

    pub fn as_ref(&self) -> Snapshot<&V> {
        Snapshot {
            key: self.key.clone(),
            value: &self.value,
            source: self.source,
            retrieved_at: self.retrieved_at,
        }
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn into_parts(self) -> (CacheKey, V, Source, Instant) {
        (self.key, self.value, self.source, self.retrieved_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    fn key() -> CacheKey {
        Namespace::root().nested("snap").key("k")
    }

    #[test]
    fn constructors_set_source() {
        assert!(Snapshot::cached(key(), 1).is_cached());
        assert!(Snapshot::computed(key(), 1).is_computed());
        assert!(Snapshot::updated(key(), 1).is_updated());
        assert_eq!(Source::Computed.to_string(), "computed");
    }

    #[test]
    fn map_preserves_metadata() {
        let at = Instant::now();
        let snap = Snapshot::new(key(), 2, Source::Computed, at);
        let mapped = snap.map(|v| v.to_string());
        assert_eq!(mapped.value(), "2");
        assert_eq!(mapped.source(), Source::Computed);
        assert_eq!(mapped.retrieved_at(), at);
        assert_eq!(mapped.key(), &key());
    }

    #[test]
    fn bind_propagates_errors() {
        let snap = Snapshot::cached(key(), 2);
        let ok = snap.clone().bind(|v| Either::<String, i32>::Right(v * 3));
        assert_eq!(ok.right().map(Snapshot::into_value), Some(6));

        let err = snap.bind(|_| Either::<String, i32>::Left("bad".into()));
        assert_eq!(err.left(), Some("bad".to_string()));
    }

    #[test]
    fn age_at_saturates() {
        let at = Instant::now();
        let snap = Snapshot::new(key(), (), Source::Cached, at + Duration::from_secs(5));
        assert_eq!(snap.age_at(at), Duration::ZERO);
        let later = Snapshot::new(key(), (), Source::Cached, at);
        assert_eq!(later.age_at(at + Duration::from_secs(3)), Duration::from_secs(3));
    }
}
