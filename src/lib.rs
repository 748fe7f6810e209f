//! typed_cache: typed, composable in-process caching.
//!
//! - [`algebra`]: `Either` / `Maybe` result types returned by every operation.
//! - [`namespace`], [`key`]: hierarchical addressing (`app:users` + `42`).
//! - [`snapshot`]: value envelope with provenance (`cached` / `computed` /
//!   `updated`) and retrieval time.
//! - [`traits`]: the [`Store`](traits::Store) contract shared by backends and
//!   decorators.
//! - [`store`]: the TTL memory backend and the external adapter backend.
//! - [`decorator`], [`instrument`]: behavior layered around a store, and the
//!   instrumentation events it produces.
//! - [`cache_ref`]: a store bound to one key.
//! - [`registry`], [`builder`]: name-based assembly of a backend and its
//!   decorators into one [`SharedStore`](traits::SharedStore).

pub mod algebra;
pub mod builder;
pub mod cache_ref;
pub mod clock;
pub mod config;
pub mod decorator;
pub mod ds;
pub mod error;
pub mod instrument;
pub mod key;
pub mod namespace;
pub mod prelude;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod traits;
