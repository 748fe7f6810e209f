//! Fully-qualified cache keys.
//!
//! A [`CacheKey`] pairs a [`Namespace`] with a raw key string and renders as
//! `namespace + delimiter + key`. [`CacheKey::belongs_to`] is the only
//! mechanism used to scope bulk operations (`clear`, `size`, `keys`) in a
//! shared table, so the prefix check is segment aware: a key in `users2`
//! does not belong to `users`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::namespace::Namespace;

/// Address of one cached value.
#[derive(Debug, Clone)]
pub struct CacheKey {
    namespace: Namespace,
    key: Arc<str>,
}

impl CacheKey {
    pub fn new(namespace: Namespace, key: impl Into<Arc<str>>) -> Self {
        Self {
            namespace,
            key: key.into(),
        }
    }

    #[inline]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The raw key, without its namespace.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when this key lives in `namespace` or any namespace nested below
    /// it. Every key belongs to root.
    pub fn belongs_to(&self, namespace: &Namespace) -> bool {
        if namespace.is_root() {
            return true;
        }
        let mine = self.namespace.as_str();
        let prefix = namespace.as_str();
        match mine.strip_prefix(prefix) {
            Some("") => true,
            Some(rest) => rest.starts_with(namespace.delimiter()),
            None => false,
        }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.key == other.key
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.key.hash(state);
    }
}

impl PartialOrd for CacheKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CacheKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .as_str()
            .cmp(other.namespace.as_str())
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_root() {
            f.write_str(&self.key)
        } else {
            write!(f, "{}{}{}", self.namespace, self.namespace.delimiter(), self.key)
        }
    }
}

/// Anything that can name a key relative to a namespace.
///
/// Strings are qualified with the namespace's key factory; a [`CacheKey`]
/// is already qualified and passes through untouched.
pub trait IntoCacheKey {
    fn into_cache_key(self, namespace: &Namespace) -> CacheKey;
}

impl IntoCacheKey for &str {
    fn into_cache_key(self, namespace: &Namespace) -> CacheKey {
        namespace.key(self)
    }
}

impl IntoCacheKey for String {
    fn into_cache_key(self, namespace: &Namespace) -> CacheKey {
        namespace.key(&self)
    }
}

impl IntoCacheKey for &String {
    fn into_cache_key(self, namespace: &Namespace) -> CacheKey {
        namespace.key(self)
    }
}

impl IntoCacheKey for CacheKey {
    fn into_cache_key(self, _namespace: &Namespace) -> CacheKey {
        self
    }
}

impl IntoCacheKey for &CacheKey {
    fn into_cache_key(self, _namespace: &Namespace) -> CacheKey {
        self.clone()
    }
}
