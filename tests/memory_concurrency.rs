// ==============================================
// MEMORY BACKEND CONCURRENCY TESTS (integration)
// ==============================================
//
// Concurrent fetches for one missing key must run the computation once and
// agree on the result. Different keys must not serialize behind each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use typed_cache::prelude::*;

// ==============================================
// Single key: compute exactly once
// ==============================================

mod single_key {
    use super::*;

    #[test]
    fn concurrent_fetch_computes_once() {
        const THREADS: usize = 16;

        let backend = MemoryBackend::<String>::new(Namespace::at(["concurrency"]));
        let store = backend.clone().into_shared();
        let computations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let store = Arc::clone(&store);
                let computations = Arc::clone(&computations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .fetch_with("expensive", || {
                            computations.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Some(format!("computed-by-{i}"))
                        })
                        .right_or_raise()
                })
            })
            .collect();

        let snapshots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(computations.load(Ordering::SeqCst), 1);
        let first = snapshots[0].value().clone();
        assert!(first.is_some());
        assert!(snapshots.iter().all(|s| *s.value() == first));
        assert_eq!(snapshots.iter().filter(|s| s.is_computed()).count(), 1);
        assert_eq!(snapshots.iter().filter(|s| s.is_cached()).count(), THREADS - 1);

        let metrics = backend.metrics();
        assert_eq!(metrics.computes, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, (THREADS - 1) as u64);
    }

    #[test]
    fn failed_compute_lets_next_caller_retry() {
        let store = MemoryBackend::<u32>::new(Namespace::at(["retry"])).into_shared();

        let failed =
            store.try_fetch_with("k", || Err::<Option<u32>, BoxError>("upstream timeout".into()));
        assert!(failed.is_left());

        let retried = store.try_fetch_with("k", || Ok::<_, BoxError>(Some(5))).right_or_raise();
        assert!(retried.is_computed());
        assert_eq!(retried.into_value(), Maybe::Some(5));
    }

    #[test]
    fn panicking_compute_releases_key_lock() {
        let store = MemoryBackend::<u32>::new(Namespace::at(["panics"])).into_shared();

        let panicking = Arc::clone(&store);
        let joined = thread::spawn(move || {
            let _ = panicking.fetch_with("k", || panic!("compute bug"));
        })
        .join();
        assert!(joined.is_err());

        let snapshot = store.fetch_with("k", || Some(1)).right_or_raise();
        assert!(snapshot.is_computed());
    }
}

// ==============================================
// Many keys: independent progress
// ==============================================

mod many_keys {
    use super::*;

    #[test]
    fn each_key_computed_once_under_contention() {
        const THREADS: usize = 8;
        const KEYS: usize = 32;

        let store = MemoryBackend::<usize>::new(Namespace::at(["many"])).into_shared();
        let computations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                let computations = Arc::clone(&computations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for k in 0..KEYS {
                        let snapshot = store
                            .fetch_with(format!("key-{k}"), || {
                                computations.fetch_add(1, Ordering::SeqCst);
                                Some(k * 10)
                            })
                            .right_or_raise();
                        assert_eq!(snapshot.into_value(), Maybe::Some(k * 10));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(computations.load(Ordering::SeqCst), KEYS);
    }

    #[test]
    fn concurrent_writes_and_deletes_leave_consistent_state() {
        const THREADS: usize = 8;
        const OPS: usize = 200;

        let backend = MemoryBackend::<usize>::new(Namespace::at(["churn"]));
        let store = backend.clone().into_shared();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..OPS {
                        let key = format!("k{}", i % 10);
                        if (i + t) % 3 == 0 {
                            store.remove(key.as_str()).right_or_raise();
                        } else {
                            store.set(key.as_str(), t * OPS + i).right_or_raise();
                        }
                        assert!(store.get(key.as_str()).is_right());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(backend.size() <= 10);
        assert_eq!(backend.keys().len(), backend.size());
    }
}
