//! Hierarchical namespaces for cache keys.
//!
//! A [`Namespace`] is an immutable, delimiter-joined path such as
//! `typed_cache:users:sessions`. Every derivation (`nested`, `join`,
//! `parent_namespace`) returns a new value; the receiver is never modified.
//!
//! ```text
//!   root ("")
//!     └── typed_cache                 Namespace::at([] as [&str; 0])
//!           └── typed_cache:users     Namespace::at(["users"])
//!                 └── typed_cache:users:sessions
//!                       └── key "abc" → "typed_cache:users:sessions:abc"
//! ```
//!
//! Equality and hashing are structural over the rendered path. The key
//! factory is inherited by derived namespaces unless replaced.
//!
//! ## Example Usage
//!
//! ```
//! use typed_cache::namespace::Namespace;
//!
//! let users = Namespace::at(["users"]);
//! assert_eq!(users.as_str(), "typed_cache:users");
//!
//! let sessions = users.nested("sessions");
//! assert_eq!(sessions.key("abc").to_string(), "typed_cache:users:sessions:abc");
//! assert_eq!(sessions.parent_namespace(), users);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::{CacheConfig, DEFAULT_DELIMITER};
use crate::key::CacheKey;

/// Builds the [`CacheKey`] for a raw key string inside a namespace.
pub type KeyFactory = Arc<dyn Fn(&Namespace, &str) -> CacheKey + Send + Sync>;

fn default_key_factory() -> KeyFactory {
    Arc::new(|namespace: &Namespace, key: &str| CacheKey::new(namespace.clone(), key))
}

/// Immutable, delimiter-joined namespace path.
#[derive(Clone)]
pub struct Namespace {
    path: Arc<str>,
    delimiter: Arc<str>,
    key_factory: KeyFactory,
}

impl Namespace {
    /// The empty namespace, using the default `:` delimiter.
    pub fn root() -> Self {
        Self::root_with(DEFAULT_DELIMITER)
    }

    /// The empty namespace with a custom delimiter.
    pub fn root_with(delimiter: &str) -> Self {
        Self {
            path: Arc::from(""),
            delimiter: Arc::from(delimiter),
            key_factory: default_key_factory(),
        }
    }

    /// Segments appended below the default configured namespace.
    pub fn at<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::at_with(&CacheConfig::default(), segments)
    }

    /// Segments appended below `config.default_namespace`, joined with
    /// `config.delimiter`.
    pub fn at_with<I, S>(config: &CacheConfig, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::root_with(&config.delimiter)
            .nested(&config.default_namespace)
            .join(segments)
    }

    /// Appends one segment.
    pub fn nested(&self, segment: impl AsRef<str>) -> Self {
        self.join([segment])
    }

    /// Appends one segment and replaces the key factory.
    pub fn nested_with_factory(&self, segment: impl AsRef<str>, key_factory: KeyFactory) -> Self {
        Self {
            key_factory,
            ..self.nested(segment)
        }
    }

    /// Appends several segments. Empty segments are skipped.
    pub fn join<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::from(&*self.path);
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                continue;
            }
            if !path.is_empty() {
                path.push_str(&self.delimiter);
            }
            path.push_str(segment);
        }
        self.with_path(path)
    }

    /// Strips the last segment. Returns `self` at root and root for a
    /// single-segment namespace.
    pub fn parent_namespace(&self) -> Self {
        if self.is_root() {
            return self.clone();
        }
        match self.path.rfind(&*self.delimiter) {
            Some(idx) => self.with_path(self.path[..idx].to_string()),
            None => self.with_path(String::new()),
        }
    }

    /// Builds a key in this namespace through the key factory.
    pub fn key(&self, key: &str) -> CacheKey {
        (self.key_factory)(self, key)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Path segments, outermost first. Empty at root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .split(&*self.delimiter)
            .filter(|segment| !segment.is_empty())
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            path: Arc::from(path),
            delimiter: Arc::clone(&self.delimiter),
            key_factory: Arc::clone(&self.key_factory),
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::root()
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Namespace {}

impl Hash for Namespace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self.path)
    }
}

/// Where a rescoped store should live, relative to the current namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceTarget {
    /// Use this namespace as is.
    Namespace(Namespace),
    /// Nest one segment under the current namespace.
    Segment(String),
    /// Join several segments under the current namespace.
    Segments(Vec<String>),
}

impl NamespaceTarget {
    pub fn resolve(self, current: &Namespace) -> Namespace {
        match self {
            Self::Namespace(ns) => ns,
            Self::Segment(segment) => current.nested(segment),
            Self::Segments(segments) => current.join(segments),
        }
    }
}

impl From<Namespace> for NamespaceTarget {
    fn from(ns: Namespace) -> Self {
        Self::Namespace(ns)
    }
}

impl From<&Namespace> for NamespaceTarget {
    fn from(ns: &Namespace) -> Self {
        Self::Namespace(ns.clone())
    }
}

impl From<&str> for NamespaceTarget {
    fn from(segment: &str) -> Self {
        Self::Segment(segment.to_string())
    }
}

impl From<String> for NamespaceTarget {
    fn from(segment: String) -> Self {
        Self::Segment(segment)
    }
}

impl From<Vec<String>> for NamespaceTarget {
    fn from(segments: Vec<String>) -> Self {
        Self::Segments(segments)
    }
}

impl From<&[&str]> for NamespaceTarget {
    fn from(segments: &[&str]) -> Self {
        Self::Segments(segments.iter().map(|s| s.to_string()).collect())
    }
}
