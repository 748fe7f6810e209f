//! Instrumenter that does nothing.

use crate::config::DEFAULT_NAMESPACE;
use crate::error::InstrumentError;
use crate::instrument::{CacheEvent, EventFilter, Instrumenter, Subscriber, SubscriptionId};

/// Disabled instrumenter. Publishing succeeds and reaches no one;
/// subscriptions are accepted and never called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullInstrumenter {
    namespace: String,
}

impl NullInstrumenter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for NullInstrumenter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Instrumenter for NullInstrumenter {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn publish(&self, _event: &CacheEvent) -> Result<(), InstrumentError> {
        Ok(())
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
