//! Observable facts about an operation's result.
//!
//! Each result shape of the store contract has its own extractor. They only
//! borrow the result, so a decorator can report on it and still return it
//! untouched.

use std::time::Duration;

use crate::algebra::{Either, Maybe};
use crate::error::{CacheError, CacheResult};
use crate::snapshot::{Snapshot, Source};
use crate::traits::SnapshotMap;

/// Extractor for one result type.
pub type OutcomeFn<R> = fn(&R) -> OutcomeFields;

/// What instrumentation records about a finished call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeFields {
    pub success: bool,
    /// `Some` only for lookups (`read`, `fetch` and their batch forms).
    pub cache_hit: Option<bool>,
    pub cache_miss: Option<bool>,
    pub source: Option<Source>,
    pub snapshot_age: Option<Duration>,
    /// Batch size, for batch operations.
    pub count: Option<usize>,
    pub error_type: Option<&'static str>,
    pub error_message: Option<String>,
}

impl OutcomeFields {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(err: &CacheError) -> Self {
        Self {
            success: false,
            error_type: Some(err.kind()),
            error_message: Some(err.to_string()),
            ..Self::default()
        }
    }
}

fn on_success<T>(result: &CacheResult<T>, f: impl FnOnce(&T) -> OutcomeFields) -> OutcomeFields {
    match result {
        Either::Right(value) => f(value),
        Either::Left(err) => OutcomeFields::failed(err),
    }
}

fn snapshot_fields<T>(snapshot: &Snapshot<T>) -> OutcomeFields {
    OutcomeFields {
        source: Some(snapshot.source()),
        snapshot_age: Some(snapshot.age()),
        ..OutcomeFields::succeeded()
    }
}

/// `read` and `fetch`: a hit is a `cached` snapshot holding a value.
pub fn lookup<V>(result: &CacheResult<Snapshot<Maybe<V>>>) -> OutcomeFields {
    on_success(result, |snapshot| {
        let hit = snapshot.is_cached() && snapshot.value().is_some();
        OutcomeFields {
            cache_hit: Some(hit),
            cache_miss: Some(!hit),
            ..snapshot_fields(snapshot)
        }
    })
}

pub fn write<V>(result: &CacheResult<Snapshot<V>>) -> OutcomeFields {
    on_success(result, snapshot_fields)
}

pub fn delete<V>(result: &CacheResult<Maybe<V>>) -> OutcomeFields {
    on_success(result, |_| OutcomeFields::succeeded())
}

pub fn clear(result: &CacheResult<()>) -> OutcomeFields {
    on_success(result, |_| OutcomeFields::succeeded())
}

/// `contains_key` cannot fail; a present key counts as a hit.
pub fn presence(result: &bool) -> OutcomeFields {
    OutcomeFields {
        cache_hit: Some(*result),
        cache_miss: Some(!*result),
        ..OutcomeFields::succeeded()
    }
}

/// Batch lookups: a hit only if every key hit.
pub fn batch_lookup<V>(result: &CacheResult<SnapshotMap<Maybe<V>>>) -> OutcomeFields {
    on_success(result, |snapshots| {
        let hit = !snapshots.is_empty()
            && snapshots
                .values()
                .all(|s| s.is_cached() && s.value().is_some());
        OutcomeFields {
            cache_hit: Some(hit),
            cache_miss: Some(!hit),
            count: Some(snapshots.len()),
            ..OutcomeFields::succeeded()
        }
    })
}

pub fn batch_write<V>(result: &CacheResult<SnapshotMap<V>>) -> OutcomeFields {
    on_success(result, |snapshots| OutcomeFields {
        source: Some(Source::Updated),
        count: Some(snapshots.len()),
        ..OutcomeFields::succeeded()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::namespace::Namespace;

    #[test]
    fn lookup_flags() {
        let key = Namespace::root().key("k");
        let hit: CacheResult<_> = Either::Right(Snapshot::cached(key.clone(), Maybe::Some(1)));
        let fields = lookup(&hit);
        assert!(fields.success);
        assert_eq!(fields.cache_hit, Some(true));
        assert_eq!(fields.source, Some(Source::Cached));

        let empty: CacheResult<_> =
            Either::Right(Snapshot::cached(key.clone(), Maybe::<i32>::Nothing));
        assert_eq!(lookup(&empty).cache_miss, Some(true));

        let computed: CacheResult<_> = Either::Right(Snapshot::computed(key, Maybe::Some(1)));
        assert_eq!(lookup(&computed).cache_hit, Some(false));
    }

    #[test]
    fn failures_carry_error_type() {
        let failed: CacheResult<Snapshot<Maybe<i32>>> =
            Either::Left(StoreError::new("read", "k", "boom").into());
        let fields = lookup(&failed);
        assert!(!fields.success);
        assert_eq!(fields.cache_hit, None);
        assert_eq!(fields.error_type, Some("store_error"));
        assert_eq!(fields.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn presence_and_batches() {
        assert_eq!(presence(&true).cache_hit, Some(true));
        let empty: CacheResult<SnapshotMap<Maybe<u8>>> = Either::Right(SnapshotMap::default());
        let fields = batch_lookup(&empty);
        assert_eq!(fields.count, Some(0));
        assert_eq!(fields.cache_hit, Some(false));
    }
}
