//! Result algebra shared by every store operation.
//!
//! [`Either`] carries fallible outcomes (`Left` = error, `Right` = success),
//! [`Maybe`] carries optional ones (`Nothing` = legitimately absent). A cache
//! miss is a `Right(Snapshot(Nothing))`, never a `Left`.

pub mod either;
pub mod maybe;

pub use either::Either;
pub use maybe::Maybe;
