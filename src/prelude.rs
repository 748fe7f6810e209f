pub use crate::algebra::{Either, Maybe};
pub use crate::builder::CacheBuilder;
pub use crate::cache_ref::CacheRef;
pub use crate::config::CacheConfig;
pub use crate::decorator::{DecoratedStore, Decorator, Instrumented, Operation};
pub use crate::error::{
    ArgumentError, BoxError, CacheError, CacheMissError, CacheResult, StoreError, TypeError,
};
pub use crate::instrument::{
    CacheEvent, EventFilter, Instrumenter, InstrumenterExt, LogInstrumenter,
    NotificationsInstrumenter, NullInstrumenter,
};
pub use crate::key::{CacheKey, IntoCacheKey};
pub use crate::namespace::{Namespace, NamespaceTarget};
pub use crate::registry::{Options, Registries};
pub use crate::snapshot::{Snapshot, Source};
pub use crate::store::{MemoryBackend, MemoryOptions};
pub use crate::traits::{CacheRefExt, SharedStore, Store, StoreExt};
