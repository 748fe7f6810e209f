//! Leaf backends.
//!
//! - [`MemoryBackend`]: TTL cache over a sharded in-process table, private or
//!   process-wide per value type.
//! - [`AdapterBackend`]: forwards to an external [`CacheAdapter`].

pub mod adapter;
pub mod memory;
pub mod metrics;
pub mod table;

pub use adapter::{AdapterBackend, CacheAdapter, WriteOptions};
pub use memory::{DEFAULT_TTL, MemoryBackend, MemoryOptions};
pub use metrics::BackendMetrics;
pub use table::MemoryTable;
