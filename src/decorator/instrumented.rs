//! Decorator that reports every store call to an [`Instrumenter`].
//!
//! One event per outermost call: while a thread is inside an instrumented
//! operation, further calls through the same decorator on that thread (from
//! an inner batch loop, or from a subscriber reacting to the event) run
//! without emitting. Other threads are unaffected.
//!
//! The wrapped operation's result is always returned as is. If publishing
//! fails or panics, the failure is logged with `tracing::warn!` and dropped.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::warn;

use crate::decorator::{Call, Decorator, OutcomeFn};
use crate::instrument::{Instrumenter, InstrumenterExt};

/// Registry name of [`Instrumented`].
pub const INSTRUMENTED: &str = "instrumented";

pub struct Instrumented {
    instrumenter: Arc<dyn Instrumenter>,
    in_flight: Mutex<FxHashSet<ThreadId>>,
}

impl Instrumented {
    pub fn new(instrumenter: Arc<dyn Instrumenter>) -> Self {
        Self {
            instrumenter,
            in_flight: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn instrumenter(&self) -> &Arc<dyn Instrumenter> {
        &self.instrumenter
    }
}

/// Clears the current thread's in-flight mark, also on unwind.
struct InFlight<'a> {
    set: &'a Mutex<FxHashSet<ThreadId>>,
    thread: ThreadId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.thread);
    }
}

impl Decorator for Instrumented {
    fn name(&self) -> &str {
        INSTRUMENTED
    }

    fn around<R, F>(&self, call: &Call, outcome: OutcomeFn<R>, proceed: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.instrumenter.is_enabled() {
            return proceed();
        }
        let thread = thread::current().id();
        if !self.in_flight.lock().insert(thread) {
            return proceed();
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            thread,
        };

        let (result, published) = self.instrumenter.instrument(call, outcome, proceed);
        if let Err(err) = published {
            warn!(
                operation = %call.operation,
                key = %call.key,
                error = %err,
                "instrumenter failed; result returned unchanged"
            );
        }
        result
    }
}

impl fmt::Debug for Instrumented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented")
            .field("instrumenter", &self.instrumenter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex as PlMutex;

    use super::*;
    use crate::algebra::Maybe;
    use crate::decorator::{DecoratedStore, Operation};
    use crate::traits::Store;
    use crate::error::InstrumentError;
    use crate::instrument::{
        ALL_EVENTS, CacheEvent, EventFilter, NotificationsInstrumenter, NullInstrumenter,
        Subscriber, SubscriptionId,
    };
    use crate::namespace::Namespace;
    use crate::store::MemoryBackend;
    use crate::traits::{SharedStore, StoreExt};

    fn instrumented(bus: &Arc<NotificationsInstrumenter>) -> SharedStore<String> {
        let inner = MemoryBackend::new(Namespace::root().nested("app")).into_shared();
        DecoratedStore::new(inner, Instrumented::new(bus.clone())).into_shared()
    }

    fn collect(bus: &NotificationsInstrumenter) -> Arc<PlMutex<Vec<CacheEvent>>> {
        let events = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.on(ALL_EVENTS, move |event| sink.lock().push(event.clone()));
        events
    }

    #[test]
    fn fetch_miss_then_hit() {
        let bus = Arc::new(NotificationsInstrumenter::new("cache"));
        let events = collect(&bus);
        let store = instrumented(&bus);

        let first = store.fetch_with("greet", || Some("hello".to_string())).right_or_raise();
        let second = store.fetch_with("greet", || Some("fail".to_string())).right_or_raise();
        assert!(first.is_computed());
        assert_eq!(second.into_value(), Maybe::Some("hello".to_string()));

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "cache.fetch");
        assert_eq!(events[0].key, "app:greet");
        assert_eq!(events[0].store_type, "memory");
        assert!(events[0].is_miss());
        assert!(events[1].is_hit());
    }

    #[test]
    fn batch_emits_one_event() {
        let bus = Arc::new(NotificationsInstrumenter::new("cache"));
        let events = collect(&bus);
        let store = instrumented(&bus);

        store.fetch_all_with(["a", "b", "c"], |_| Some("v".to_string())).right_or_raise();
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::FetchAll);
        assert_eq!(events[0].outcome.count, Some(3));
    }

    #[test]
    fn subscriber_reentry_is_not_reported() {
        let bus = Arc::new(NotificationsInstrumenter::new("cache"));
        let store = instrumented(&bus);
        let count = Arc::new(AtomicUsize::new(0));

        let reentrant = Arc::clone(&store);
        let c = Arc::clone(&count);
        bus.on("write", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            let _ = reentrant.get("audit");
        });
        let reads = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&reads);
        bus.on("read", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        store.set("k", "v".to_string()).right_or_raise();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        store.get("k").right_or_raise();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug)]
    struct Failing;

    impl Instrumenter for Failing {
        fn namespace(&self) -> &str {
            "failing"
        }

        fn publish(&self, event: &CacheEvent) -> Result<(), InstrumentError> {
            Err(InstrumentError::new(event.name.clone(), "sink unavailable"))
        }

        fn subscribe(
            &self,
            _operation: &str,
            _filter: EventFilter,
            _subscriber: Subscriber,
        ) -> SubscriptionId {
            SubscriptionId(0)
        }

        fn unsubscribe(&self, _id: SubscriptionId) -> bool {
            false
        }
    }

    #[test]
    fn instrumenter_failure_does_not_change_result() {
        let inner = MemoryBackend::new(Namespace::root()).into_shared();
        let store = DecoratedStore::new(inner, Instrumented::new(Arc::new(Failing)));

        let written = store.set("k", 1u32).right_or_raise();
        assert_eq!(*written.value(), 1);
        assert_eq!(store.get("k").right_or_raise().into_value(), Maybe::Some(1));

        let bus = Arc::new(NotificationsInstrumenter::new("x"));
        bus.on("read", |_| panic!("subscriber panic"));
        let store = instrumented(&bus);
        assert!(store.get("missing").is_right());
    }

    #[test]
    fn null_instrumenter_is_skipped() {
        let inner = MemoryBackend::<u8>::new(Namespace::root()).into_shared();
        let null = Arc::new(NullInstrumenter::default());
        let store = DecoratedStore::new(inner, Instrumented::new(null));
        assert_eq!(store.store_type(), "instrumented(memory)");
        assert!(store.set("k", 1).is_right());
        assert!(store.decorator().in_flight.lock().is_empty());
    }
}
