//! Presence/absence sum type.
//!
//! `Maybe` is used where absence is an expected outcome rather than an error:
//! a store read that finds nothing yields `Maybe::Nothing`, while a backend
//! failure yields an `Either::Left`.
//!
//! ## Example Usage
//!
//! ```
//! use typed_cache::algebra::Maybe;
//!
//! let present = Maybe::wrap(Some(3));
//! assert_eq!(present.map(|v| v + 1), Maybe::Some(4));
//!
//! let absent: Maybe<i32> = Maybe::wrap(None);
//! assert!(absent.is_nothing());
//! assert_eq!(absent.value_or(7), 7);
//! ```

/// `Some(V)` when present, `Nothing` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Maybe<V> {
    Some(V),
    #[default]
    Nothing,
}

impl<V> Maybe<V> {
    /// Converts a nullable value.
    #[inline]
    pub fn wrap(value: Option<V>) -> Self {
        match value {
            Some(v) => Self::Some(v),
            None => Self::Nothing,
        }
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    #[inline]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    pub fn as_ref(&self) -> Maybe<&V> {
        match self {
            Self::Some(v) => Maybe::Some(v),
            Self::Nothing => Maybe::Nothing,
        }
    }

    pub fn map<T, F>(self, f: F) -> Maybe<T>
    where
        F: FnOnce(V) -> T,
    {
        match self {
            Self::Some(v) => Maybe::Some(f(v)),
            Self::Nothing => Maybe::Nothing,
        }
    }

    pub fn bind<T, F>(self, f: F) -> Maybe<T>
    where
        F: FnOnce(V) -> Maybe<T>,
    {
        match self {
            Self::Some(v) => f(v),
            Self::Nothing => Maybe::Nothing,
        }
    }

    /// Alias of [`bind`](Self::bind).
    #[inline]
    pub fn flat_map<T, F>(self, f: F) -> Maybe<T>
    where
        F: FnOnce(V) -> Maybe<T>,
    {
        self.bind(f)
    }

    pub fn value_or(self, default: V) -> V {
        match self {
            Self::Some(v) => v,
            Self::Nothing => default,
        }
    }

    pub fn value_or_else(self, f: impl FnOnce() -> V) -> V {
        match self {
            Self::Some(v) => v,
            Self::Nothing => f(),
        }
    }

    #[inline]
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Some(v) => Some(v),
            Self::Nothing => None,
        }
    }
}

impl<V> From<Option<V>> for Maybe<V> {
    fn from(value: Option<V>) -> Self {
        Self::wrap(value)
    }
}

impl<V> From<Maybe<V>> for Option<V> {
    fn from(value: Maybe<V>) -> Self {
        value.into_option()
    }
}
