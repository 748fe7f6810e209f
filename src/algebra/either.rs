//! Two-variant sum type for fallible outcomes.
//!
//! ## Example Usage
//!
//! ```
//! use typed_cache::algebra::Either;
//!
//! let ok: Either<String, u32> = Either::Right(20);
//! let doubled = ok.map(|v| v * 2).bind(|v| {
//!     if v > 10 { Either::Right(v) } else { Either::Left("too small".to_string()) }
//! });
//! assert_eq!(doubled, Either::Right(40));
//!
//! let err: Either<String, u32> = Either::Left("boom".into());
//! assert_eq!(err.fold(|e| e.len() as u32, |v| v), 4);
//! ```

use std::fmt;

/// `Left(E)` for failures, `Right(R)` for successes.
///
/// `map` and `bind` only touch the `Right` side; a `Left` short-circuits any
/// chain built from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Either<E, R> {
    Left(E),
    Right(R),
}

impl<E, R> Either<E, R> {
    #[inline]
    pub fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    #[inline]
    pub fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }

    /// The error, if any.
    pub fn left(self) -> Option<E> {
        match self {
            Self::Left(e) => Some(e),
            Self::Right(_) => None,
        }
    }

    /// The success value, if any.
    pub fn right(self) -> Option<R> {
        match self {
            Self::Left(_) => None,
            Self::Right(r) => Some(r),
        }
    }

    pub fn as_ref(&self) -> Either<&E, &R> {
        match self {
            Self::Left(e) => Either::Left(e),
            Self::Right(r) => Either::Right(r),
        }
    }

    /// Transforms the success value.
    pub fn map<T, F>(self, f: F) -> Either<E, T>
    where
        F: FnOnce(R) -> T,
    {
        match self {
            Self::Left(e) => Either::Left(e),
            Self::Right(r) => Either::Right(f(r)),
        }
    }

    /// Transforms the error value.
    pub fn map_left<F2, F>(self, f: F) -> Either<F2, R>
    where
        F: FnOnce(E) -> F2,
    {
        match self {
            Self::Left(e) => Either::Left(f(e)),
            Self::Right(r) => Either::Right(r),
        }
    }

    /// Chains an operation that can itself fail.
    pub fn bind<T, F>(self, f: F) -> Either<E, T>
    where
        F: FnOnce(R) -> Either<E, T>,
    {
        match self {
            Self::Left(e) => Either::Left(e),
            Self::Right(r) => f(r),
        }
    }

    /// Alias of [`bind`](Self::bind).
    #[inline]
    pub fn and_then<T, F>(self, f: F) -> Either<E, T>
    where
        F: FnOnce(R) -> Either<E, T>,
    {
        self.bind(f)
    }

    /// Eliminates the union.
    pub fn fold<T>(self, on_left: impl FnOnce(E) -> T, on_right: impl FnOnce(R) -> T) -> T {
        match self {
            Self::Left(e) => on_left(e),
            Self::Right(r) => on_right(r),
        }
    }

    pub fn right_or(self, default: R) -> R {
        match self {
            Self::Left(_) => default,
            Self::Right(r) => r,
        }
    }

    pub fn right_or_else(self, f: impl FnOnce(E) -> R) -> R {
        match self {
            Self::Left(e) => f(e),
            Self::Right(r) => r,
        }
    }

    /// Converts into a standard `Result` so `?` can be used.
    #[inline]
    pub fn into_result(self) -> Result<R, E> {
        match self {
            Self::Left(e) => Err(e),
            Self::Right(r) => Ok(r),
        }
    }
}

impl<E: fmt::Display, R> Either<E, R> {
    /// Returns the success value.
    ///
    /// # Panics
    ///
    /// Panics with the error's message if `self` is `Left`.
    #[track_caller]
    pub fn right_or_raise(self) -> R {
        match self {
            Self::Left(e) => panic!("{e}"),
            Self::Right(r) => r,
        }
    }
}

impl<E, R> From<Result<R, E>> for Either<E, R> {
    fn from(result: Result<R, E>) -> Self {
        match result {
            Ok(r) => Self::Right(r),
            Err(e) => Self::Left(e),
        }
    }
}

impl<E, R> From<Either<E, R>> for Result<R, E> {
    fn from(either: Either<E, R>) -> Self {
        either.into_result()
    }
}
