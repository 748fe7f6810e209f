//! Instrumentation events and the instrumenter contract.
//!
//! An [`Instrumenter`] receives one [`CacheEvent`] per observed store call and
//! lets interested code [`subscribe`](Instrumenter::subscribe) to them. Events
//! are named `<namespace>.<operation>`, e.g. `typed_cache.fetch`.
//!
//! Implementations:
//!
//! | Name            | Type                        | Behavior                         |
//! |-----------------|-----------------------------|----------------------------------|
//! | `null`          | [`NullInstrumenter`]        | disabled, drops everything       |
//! | `notifications` | [`NotificationsInstrumenter`] | in-process pub/sub             |
//! | `log`           | [`LogInstrumenter`]         | `tracing` event + pub/sub        |
//!
//! [`InstrumenterExt::instrument`] times a closure, builds the event and
//! publishes it. A publish failure, including a panicking subscriber, comes
//! back as an [`InstrumentError`] next to the closure's result and never in
//! place of it.

pub mod log;
pub mod notifications;
pub mod null;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::decorator::{Call, Operation, OutcomeFields, OutcomeFn};
use crate::error::InstrumentError;

pub use log::LogInstrumenter;
pub use notifications::NotificationsInstrumenter;
pub use null::NullInstrumenter;

/// One observed store call.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    /// `<instrumenter namespace>.<operation>`.
    pub name: String,
    pub operation: Operation,
    pub key: String,
    pub namespace: String,
    pub store_type: String,
    pub duration: Duration,
    pub timestamp: SystemTime,
    pub outcome: OutcomeFields,
}

impl CacheEvent {
    pub fn is_hit(&self) -> bool {
        self.outcome.cache_hit == Some(true)
    }

    pub fn is_miss(&self) -> bool {
        self.outcome.cache_miss == Some(true)
    }
}

/// Handle returned by [`Instrumenter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Event callback.
pub type Subscriber = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Narrows a subscription beyond its event name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events from stores in exactly this namespace.
    pub namespace: Option<String>,
    /// Only events whose key starts with this prefix.
    pub key_prefix: Option<String>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, event: &CacheEvent) -> bool {
        let namespace_ok = self.namespace.as_deref().is_none_or(|ns| ns == event.namespace);
        let key_ok = self
            .key_prefix
            .as_deref()
            .is_none_or(|prefix| event.key.starts_with(prefix));
        namespace_ok && key_ok
    }
}

/// Subscribes to every operation when passed as the operation name.
pub const ALL_EVENTS: &str = "*";

/// Receives cache events.
pub trait Instrumenter: Send + Sync + fmt::Debug {
    /// Prefix of every event name.
    fn namespace(&self) -> &str;

    fn event_name(&self, operation: &str) -> String {
        format!("{}.{}", self.namespace(), operation)
    }

    /// Disabled instrumenters are skipped without timing the call.
    fn is_enabled(&self) -> bool {
        true
    }

    fn publish(&self, event: &CacheEvent) -> Result<(), InstrumentError>;

    /// Registers `subscriber` for `operation` (an [`Operation`] name or
    /// [`ALL_EVENTS`]).
    fn subscribe(
        &self,
        operation: &str,
        filter: EventFilter,
        subscriber: Subscriber,
    ) -> SubscriptionId;

    /// Returns whether the subscription existed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Helpers over any [`Instrumenter`].
pub trait InstrumenterExt: Instrumenter {
    /// Runs `f`, then publishes an event describing `call` and its result.
    fn instrument<R, F>(
        &self,
        call: &Call,
        outcome: OutcomeFn<R>,
        f: F,
    ) -> (R, Result<(), InstrumentError>)
    where
        F: FnOnce() -> R,
    {
        let timestamp = SystemTime::now();
        let started = Instant::now();
        let result = f();
        let duration = started.elapsed();

        let event = CacheEvent {
            name: self.event_name(call.operation.as_str()),
            operation: call.operation,
            key: call.key.clone(),
            namespace: call.namespace.clone(),
            store_type: call.store_type.clone(),
            duration,
            timestamp,
            outcome: outcome(&result),
        };
        let published = match panic::catch_unwind(AssertUnwindSafe(|| self.publish(&event))) {
            Ok(published) => published,
            Err(payload) => {
                Err(InstrumentError::new(event.name.clone(), panic_message(payload.as_ref())))
            },
        };
        (result, published)
    }

    /// Shorthand for subscribing a closure.
    fn on<F>(&self, operation: &str, f: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.subscribe(operation, EventFilter::any(), Arc::new(f))
    }
}

impl<I: Instrumenter + ?Sized> InstrumenterExt for I {}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
