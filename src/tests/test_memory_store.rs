use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use super::runtime;
use crate::{
    AdmissionMode, LeakygateError, Limit, RateStore,
    local::{Clock, ManualClock, MemoryStore, SystemClock},
};

fn store() -> (MemoryStore<ManualClock>, ManualClock) {
    let clock = ManualClock::new(1_000.0);
    (MemoryStore::with_clock(clock.clone()), clock)
}

#[test]
fn unknown_key_has_no_tat() {
    let (store, _clock) = store();

    assert_eq!(store.tat("missing"), None);
    assert!(store.is_empty());
}

#[test]
fn admission_stores_tat() {
    let (store, _clock) = store();
    let limit = Limit::per_second(10).unwrap();

    runtime::block_on(async {
        store
            .evaluate("k", &limit, 3, AdmissionMode::Exact)
            .await
            .unwrap();
    });

    let tat = store.tat("k").unwrap();
    assert!((tat - 1_000.3).abs() < 1e-9, "tat was {tat}");
    assert_eq!(store.len(), 1);
}

#[test]
fn denial_leaves_tat_untouched() {
    let (store, _clock) = store();
    let limit = Limit::per_second(2).unwrap();

    runtime::block_on(async {
        store
            .evaluate("k", &limit, 2, AdmissionMode::Exact)
            .await
            .unwrap();
        let before = store.tat("k");

        let denied = store
            .evaluate("k", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        assert_eq!(denied.allowed, 0);
        assert!(denied.retry_after.is_some());

        assert_eq!(store.tat("k"), before);
    });
}

#[test]
fn zero_cost_does_not_create_or_touch_state() {
    let (store, _clock) = store();
    let limit = Limit::per_second(10).unwrap();

    runtime::block_on(async {
        let e = store
            .evaluate("k", &limit, 0, AdmissionMode::Exact)
            .await
            .unwrap();
        assert_eq!(e.allowed, 0);
        assert_eq!(e.remaining, 10);
        assert!(store.is_empty());

        store
            .evaluate("k", &limit, 4, AdmissionMode::Exact)
            .await
            .unwrap();
        let before = store.tat("k");

        let e = store
            .evaluate("k", &limit, 0, AdmissionMode::AtMost)
            .await
            .unwrap();
        assert_eq!(e.remaining, 6);
        assert_eq!(store.tat("k"), before);
    });
}

#[test]
fn tat_expires_after_ttl() {
    let (store, clock) = store();
    // 1 permit per 10s: a single admission leaves a 10s TTL.
    let limit = Limit::new(1, 1, Duration::from_secs(10)).unwrap();

    runtime::block_on(async {
        store
            .evaluate("k", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.tat("k").is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.tat("k"), None);

        // Expired entries read as empty and are admitted again.
        let e = store
            .evaluate("k", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        assert_eq!(e.allowed, 1);
    });
}

#[test]
fn cleanup_removes_only_expired_entries() {
    let (store, clock) = store();
    let short = Limit::per_second(1).unwrap();
    let long = Limit::new(1, 1, Duration::from_secs(60)).unwrap();

    runtime::block_on(async {
        store
            .evaluate("short", &short, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        store
            .evaluate("long", &long, 1, AdmissionMode::Exact)
            .await
            .unwrap();
    });

    assert_eq!(store.cleanup(), 0);

    clock.advance(Duration::from_secs(2));
    assert_eq!(store.cleanup(), 1);
    assert_eq!(store.len(), 1);
    assert!(store.tat("long").is_some());
}

#[test]
fn cleanup_counts_only_removed_entries_during_concurrent_inserts() {
    let (store, clock) = store();
    let limit = Limit::per_second(1).unwrap();

    runtime::block_on(async {
        for i in 0..1_000 {
            store
                .evaluate(&format!("old_{i}"), &limit, 1, AdmissionMode::Exact)
                .await
                .unwrap();
        }
    });

    clock.advance(Duration::from_secs(2));

    let removed = std::thread::scope(|s| {
        s.spawn(|| {
            runtime::block_on(async {
                for i in 0..1_000 {
                    store
                        .evaluate(&format!("new_{i}"), &limit, 1, AdmissionMode::Exact)
                        .await
                        .unwrap();
                }
            });
        });

        store.cleanup()
    });

    assert_eq!(removed, 1_000);
    assert_eq!(store.len(), 1_000);
    assert_eq!(store.cleanup(), 0);
}

#[test]
fn empty_key_is_rejected() {
    let (store, _clock) = store();
    let limit = Limit::per_second(1).unwrap();

    runtime::block_on(async {
        for mode in [AdmissionMode::Exact, AdmissionMode::AtMost] {
            assert!(matches!(
                store.evaluate("", &limit, 1, mode).await,
                Err(LeakygateError::InvalidKey(_))
            ));
        }

        assert!(matches!(
            store.reset("").await,
            Err(LeakygateError::InvalidKey(_))
        ));
    });

    assert!(store.is_empty());
}

#[test]
fn reset_removes_state_and_tolerates_missing_keys() {
    let (store, _clock) = store();
    let limit = Limit::per_second(1).unwrap();

    runtime::block_on(async {
        store
            .evaluate("k", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        assert!(store.tat("k").is_some());

        store.reset("k").await.unwrap();
        assert_eq!(store.tat("k"), None);

        store.reset("k").await.unwrap();
        store.reset("never-seen").await.unwrap();
    });
}

#[test]
fn per_key_state_is_independent() {
    let (store, _clock) = store();
    let limit = Limit::per_second(2).unwrap();

    runtime::block_on(async {
        store
            .evaluate("a", &limit, 2, AdmissionMode::Exact)
            .await
            .unwrap();
        let a = store
            .evaluate("a", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        assert_eq!(a.allowed, 0);

        let b = store
            .evaluate("b", &limit, 1, AdmissionMode::Exact)
            .await
            .unwrap();
        assert_eq!(b.allowed, 1);
    });
}

#[test]
fn concurrent_callers_never_exceed_burst() {
    let clock = ManualClock::new(50.0);
    let store = Arc::new(MemoryStore::with_clock(clock));
    let limit = Limit::per_minute(25).unwrap();
    let admitted = Arc::new(AtomicU64::new(0));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    rt.block_on(async {
        let mut handles = Vec::new();

        for _ in 0..200 {
            let store = store.clone();
            let admitted = admitted.clone();

            handles.push(tokio::spawn(async move {
                let e = store
                    .evaluate("hot", &limit, 1, AdmissionMode::Exact)
                    .await
                    .unwrap();
                admitted.fetch_add(e.allowed, Ordering::Relaxed);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    });

    assert_eq!(admitted.load(Ordering::Relaxed), 25);
}

#[test]
fn concurrent_threads_at_most_share_the_burst() {
    let store = Arc::new(MemoryStore::with_clock(ManualClock::new(0.0)));
    let limit = Limit::per_hour(100).unwrap();

    let admitted: u64 = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                scope.spawn(move || {
                    runtime::block_on(async {
                        let mut total = 0;
                        for _ in 0..10 {
                            total += store
                                .evaluate("shared", &limit, 3, AdmissionMode::AtMost)
                                .await
                                .unwrap()
                                .allowed;
                        }
                        total
                    })
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(admitted, 100);
}

#[test]
fn system_clock_counts_from_tat_epoch() {
    let now = SystemClock.now();

    // Later than 2024-01-01 and earlier than 2100-01-01, relative to 2017-01-01.
    assert!(now > 220_838_400.0, "now was {now}");
    assert!(now < 2_619_216_000.0, "now was {now}");
}
