//! Error types for typed_cache.
//!
//! ## Key Components
//!
//! - [`CacheError`]: the single error type carried in the `Left` side of every
//!   [`CacheResult`].
//! - [`StoreError`]: a backend, decorator or factory failed while performing an
//!   operation. Wraps the underlying cause.
//! - [`CacheMissError`]: an expected value was absent. Misses are normally
//!   reported as `Maybe::Nothing`, so this only surfaces from helpers that
//!   insist on a value (e.g. [`CacheRef::value`](crate::cache_ref::CacheRef::value)).
//! - [`TypeError`]: a configuration value had the wrong type.
//! - [`ArgumentError`]: builder or registry misconfiguration.
//! - [`InstrumentError`]: an instrumenter failed to publish an event. Never
//!   escapes a store operation.
//!
//! ## Example Usage
//!
//! ```
//! use typed_cache::error::{CacheError, StoreError};
//!
//! let err = StoreError::new("write", "app:users:42", "disk full");
//! assert_eq!(
//!     err.detailed_message(),
//!     "WRITE operation failed for key 'app:users:42': disk full"
//! );
//! let err: CacheError = err.into();
//! assert!(err.is_store());
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::algebra::Either;
use crate::key::CacheKey;

/// Boxed error returned by user computations and adapter calls.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type of every fallible store operation.
pub type CacheResult<T> = Either<CacheError, T>;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors produced by stores, registries and the cache builder.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    CacheMiss(#[from] CacheMissError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

impl CacheError {
    /// Shorthand for an [`ArgumentError`].
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(ArgumentError::new(msg))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type(_))
    }

    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Short, stable name of the variant. Used in instrumentation payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_error",
            Self::CacheMiss(_) => "cache_miss_error",
            Self::Type(_) => "type_error",
            Self::Argument(_) => "argument_error",
        }
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// A store operation failed.
///
/// `cause` is reference counted so the error (and any `Either` carrying it)
/// stays cheaply cloneable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    operation: String,
    key: String,
    message: String,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl StoreError {
    pub fn new(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the underlying failure.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attaches an already boxed failure.
    pub fn with_boxed_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(Arc::from(cause));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn has_cause(&self) -> bool {
        self.cause.is_some()
    }

    /// Operation, key, message and cause on one line.
    pub fn detailed_message(&self) -> String {
        let base = format!(
            "{} operation failed for key '{}': {}",
            self.operation.to_uppercase(),
            self.key,
            self.message
        );
        match &self.cause {
            Some(cause) => format!("{base} ({cause})"),
            None => base,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheMissError
// ---------------------------------------------------------------------------

/// A value was required but the key was absent or expired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cache miss for key: {key}")]
pub struct CacheMissError {
    key: CacheKey,
}

impl CacheMissError {
    pub fn new(key: CacheKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// TypeError
// ---------------------------------------------------------------------------

/// A configuration value did not have the expected type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TypeError {
    expected: String,
    actual: String,
    value: String,
    message: String,
}

impl TypeError {
    pub fn new(
        expected: impl Into<String>,
        actual: impl Into<String>,
        value: impl fmt::Debug,
        message: impl Into<String>,
    ) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
            value: format!("{value:?}"),
            message: message.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }

    /// Debug rendering of the offending value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn type_mismatch_message(&self) -> String {
        format!("Expected {}, got {}", self.expected, self.actual)
    }
}

// ---------------------------------------------------------------------------
// ArgumentError
// ---------------------------------------------------------------------------

/// Builder or registry misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ArgumentError(String);

impl ArgumentError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// InstrumentError
// ---------------------------------------------------------------------------

/// An instrumenter could not deliver an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("instrumentation failed for '{event}': {message}")]
pub struct InstrumentError {
    event: String,
    message: String,
}

impl InstrumentError {
    pub fn new(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            message: message.into(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    // -- StoreError -------------------------------------------------------

    #[test]
    fn store_display_shows_message() {
        let err = StoreError::new("read", "ns:k", "connection reset");
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn store_detailed_message_includes_cause() {
        let io = std::io::Error::other("broken pipe");
        let err = StoreError::new("fetch", "ns:k", "backend failed").with_cause(io);
        assert!(err.has_cause());
        assert_eq!(
            err.detailed_message(),
            "FETCH operation failed for key 'ns:k': backend failed (broken pipe)"
        );
    }

    #[test]
    fn store_source_is_the_cause() {
        let err = StoreError::new("write", "k", "x").with_cause(std::io::Error::other("io"));
        let source = StdError::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("io"));
    }

    #[test]
    fn store_without_cause() {
        let err = StoreError::new("delete", "k", "gone");
        assert!(!err.has_cause());
        assert!(err.cause().is_none());
        assert_eq!(err.operation(), "delete");
        assert_eq!(err.key(), "k");
    }

    // -- CacheMissError ---------------------------------------------------

    #[test]
    fn cache_miss_mentions_key() {
        let key = Namespace::root().nested("users").key("7");
        let err = CacheMissError::new(key.clone());
        assert_eq!(err.to_string(), "Cache miss for key: users:7");
        assert_eq!(err.key(), &key);
    }

    // -- TypeError --------------------------------------------------------

    #[test]
    fn type_error_mismatch_message() {
        let err = TypeError::new("duration", "integer", 42, "option 'ttl' has the wrong type");
        assert_eq!(err.type_mismatch_message(), "Expected duration, got integer");
        assert_eq!(err.value(), "42");
        assert_eq!(err.to_string(), "option 'ttl' has the wrong type");
    }

    // -- CacheError -------------------------------------------------------

    #[test]
    fn cache_error_is_transparent() {
        let err: CacheError = ArgumentError::new("Backend not configured").into();
        assert_eq!(err.to_string(), "Backend not configured");
        assert!(err.is_argument());
        assert_eq!(err.kind(), "argument_error");
    }

    #[test]
    fn cache_error_implements_std_error() {
        fn assert_error<T: StdError + Send + Sync + Clone>() {}
        assert_error::<CacheError>();
        assert_error::<StoreError>();
        assert_error::<InstrumentError>();
    }
}
