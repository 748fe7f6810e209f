//! In-process publish/subscribe instrumenter.
//!
//! Subscribers are matched on the full event name (or [`ALL_EVENTS`]) and
//! then on their [`EventFilter`]. Matching callbacks are collected under a
//! read lock and invoked after it is released, so a subscriber may itself
//! subscribe, unsubscribe or touch an instrumented store.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::config::DEFAULT_NAMESPACE;
use crate::error::InstrumentError;
use crate::instrument::{
    ALL_EVENTS, CacheEvent, EventFilter, Instrumenter, Subscriber, SubscriptionId, panic_message,
};

struct Subscription {
    id: SubscriptionId,
    /// Full event name, or [`ALL_EVENTS`].
    event_name: String,
    filter: EventFilter,
    subscriber: Subscriber,
}

/// Pub/sub event bus keyed by event name.
pub struct NotificationsInstrumenter {
    namespace: String,
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl NotificationsInstrumenter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn matching(&self, event: &CacheEvent) -> Vec<Subscriber> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.event_name == ALL_EVENTS || s.event_name == event.name)
            .filter(|s| s.filter.matches(event))
            .map(|s| s.subscriber.clone())
            .collect()
    }
}

impl Default for NotificationsInstrumenter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl std::fmt::Debug for NotificationsInstrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationsInstrumenter")
            .field("namespace", &self.namespace)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Instrumenter for NotificationsInstrumenter {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every matching subscriber is called even if an earlier one panics;
    /// the first panic is reported.
    fn publish(&self, event: &CacheEvent) -> Result<(), InstrumentError> {
        let mut first_failure = None;
        for subscriber in self.matching(event) {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| subscriber(event))) {
                first_failure.get_or_insert_with(|| panic_message(payload.as_ref()));
            }
        }
        match first_failure {
            None => Ok(()),
            Some(message) => Err(InstrumentError::new(event.name.clone(), message)),
        }
    }

    fn subscribe(
        &self,
        operation: &str,
        filter: EventFilter,
        subscriber: Subscriber,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_name = if operation == ALL_EVENTS {
            ALL_EVENTS.to_string()
        } else {
            self.event_name(operation)
        };
        self.subscriptions.write().push(Subscription {
            id,
            event_name,
            filter,
            subscriber,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::decorator::{Operation, OutcomeFields};
    use crate::instrument::InstrumenterExt;

    fn event(bus: &NotificationsInstrumenter, operation: Operation, namespace: &str) -> CacheEvent {
        CacheEvent {
            name: bus.event_name(operation.as_str()),
            operation,
            key: format!("{namespace}:k"),
            namespace: namespace.to_string(),
            store_type: "memory".to_string(),
            duration: Duration::from_micros(5),
            timestamp: SystemTime::now(),
            outcome: OutcomeFields::succeeded(),
        }
    }

    #[test]
    fn delivers_by_event_name_and_filter() {
        let bus = NotificationsInstrumenter::new("app");
        let reads = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));
        let users_only = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&reads);
        bus.on("read", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let a = Arc::clone(&all);
        bus.on(ALL_EVENTS, move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let u = Arc::clone(&users_only);
        bus.subscribe(
            "read",
            EventFilter::namespace("users"),
            Arc::new(move |_: &CacheEvent| {
                u.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(&event(&bus, Operation::Read, "users")).unwrap();
        bus.publish(&event(&bus, Operation::Read, "posts")).unwrap();
        bus.publish(&event(&bus, Operation::Write, "users")).unwrap();

        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(all.load(Ordering::SeqCst), 3);
        assert_eq!(users_only.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = NotificationsInstrumenter::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let id = bus.on("clear", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&event(&bus, Operation::Clear, "x")).unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&event(&bus, Operation::Clear, "x")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_starve_others() {
        let bus = NotificationsInstrumenter::new("app");
        let seen = Arc::new(AtomicUsize::new(0));
        bus.on("read", |_| panic!("bad subscriber"));
        let s = Arc::clone(&seen);
        bus.on("read", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let err = bus.publish(&event(&bus, Operation::Read, "x")).unwrap_err();
        assert_eq!(err.event(), "app.read");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_may_resubscribe_during_publish() {
        let bus = Arc::new(NotificationsInstrumenter::new("app"));
        let inner = Arc::clone(&bus);
        bus.on("read", move |_| {
            inner.on("write", |_| {});
        });
        bus.publish(&event(&bus, Operation::Read, "x")).unwrap();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
