pub mod key_lock;
pub mod shard;

pub use key_lock::{KeyLockGuard, KeyLocks};
pub use shard::{DEFAULT_SHARDS, ShardSelector};
