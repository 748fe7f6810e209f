//! Instrumenter that turns cache events into `tracing` events.
//!
//! Events are emitted at `DEBUG` under the `typed_cache::events` target, with
//! failures at `WARN`. Subscriptions behave exactly as in
//! [`NotificationsInstrumenter`], which this type delegates them to.

use tracing::{debug, warn};

use crate::config::DEFAULT_NAMESPACE;
use crate::error::InstrumentError;
use crate::instrument::{
    CacheEvent, EventFilter, Instrumenter, NotificationsInstrumenter, Subscriber, SubscriptionId,
};

#[derive(Debug)]
pub struct LogInstrumenter {
    bus: NotificationsInstrumenter,
}

impl LogInstrumenter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            bus: NotificationsInstrumenter::new(namespace),
        }
    }
}

impl Default for LogInstrumenter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Instrumenter for LogInstrumenter {
    fn namespace(&self) -> &str {
        self.bus.namespace()
    }

    fn publish(&self, event: &CacheEvent) -> Result<(), InstrumentError> {
        let outcome = &event.outcome;
        if outcome.success {
            debug!(
                target: "typed_cache::events",
                event = %event.name,
                key = %event.key,
                namespace = %event.namespace,
                store_type = %event.store_type,
                duration_us = event.duration.as_micros() as u64,
                cache_hit = ?outcome.cache_hit,
                source = ?outcome.source,
                "cache operation"
            );
        } else {
            warn!(
                target: "typed_cache::events",
                event = %event.name,
                key = %event.key,
                namespace = %event.namespace,
                store_type = %event.store_type,
                duration_us = event.duration.as_micros() as u64,
                error_type = outcome.error_type.unwrap_or("unknown"),
                error = outcome.error_message.as_deref().unwrap_or(""),
                "cache operation failed"
            );
        }
        self.bus.publish(event)
    }

    fn subscribe(
        &self,
        operation: &str,
        filter: EventFilter,
        subscriber: Subscriber,
    ) -> SubscriptionId {
        self.bus.subscribe(operation, filter, subscriber)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::decorator::{Operation, OutcomeFields};
    use crate::instrument::InstrumenterExt;

    #[test]
    fn logs_and_forwards_to_subscribers() {
        let log = LogInstrumenter::new("svc");
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        log.on("write", move |event| {
            assert_eq!(event.name, "svc.write");
            s.fetch_add(1, Ordering::SeqCst);
        });

        let event = CacheEvent {
            name: log.event_name("write"),
            operation: Operation::Write,
            key: "k".to_string(),
            namespace: String::new(),
            store_type: "memory".to_string(),
            duration: Duration::from_millis(1),
            timestamp: SystemTime::now(),
            outcome: OutcomeFields::succeeded(),
        };
        log.publish(&event).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(log.is_enabled());
    }
}
