//! Concurrent/Multi-threaded Tests for strata-concurrency
//!
//! These tests verify correct behavior under actual concurrent execution:
//!
//! 1. **First-Committer-Wins** - Exactly one of N racing writers commits
//! 2. **Version Monotonicity** - Commit versions are unique and increasing
//! 3. **Snapshot Isolation** - Readers never observe a partial commit
//! 4. **GC under load** - Collection concurrent with readers keeps their
//!    snapshots intact
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test concurrent_tests
//! cargo test --test concurrent_tests -- --nocapture --test-threads=1
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use strata_concurrency::{TransactionManager, TxnMap};
use strata_core::{KeyOrder, ReadView};
use strata_storage::{Allocators, BurstTrie, TxnFlatMap};

// ============================================================================
// Test Helpers
// ============================================================================

fn flat_map(manager: &Arc<TransactionManager>) -> TxnMap<u64> {
    TxnMap::new(
        manager,
        "flat",
        Box::new(TxnFlatMap::new(
            Allocators::default(),
            KeyOrder::Qualified.comparator(),
        )),
    )
}

fn trie(manager: &Arc<TransactionManager>) -> TxnMap<u64> {
    TxnMap::new(
        manager,
        "trie",
        Box::new(BurstTrie::new(Allocators::default(), 4)),
    )
}

// ============================================================================
// First-Committer-Wins
// ============================================================================

#[test]
fn test_exactly_one_racing_writer_commits() {
    const THREADS: usize = 8;

    for map_factory in [flat_map, trie] {
        let manager = Arc::new(TransactionManager::new());
        let map = map_factory(&manager);
        let seed = manager.begin();
        map.put(&seed, "ns.hot", 0).unwrap();
        seed.commit().unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let wins = Arc::new(AtomicUsize::new(0));
        let conflicts = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let map = map.clone();
                let barrier = Arc::clone(&barrier);
                let wins = Arc::clone(&wins);
                let conflicts = Arc::clone(&conflicts);
                thread::spawn(move || {
                    let txn = manager.begin();
                    map.put(&txn, "ns.hot", i as u64 + 1).unwrap();
                    barrier.wait();
                    match txn.commit() {
                        Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                        Err(err) => {
                            assert!(err.is_conflict());
                            conflicts.fetch_add(1, Ordering::SeqCst)
                        }
                    };
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every transaction began before any of them committed
        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(conflicts.load(Ordering::SeqCst), THREADS - 1);
        assert_eq!(manager.metrics().conflicted, (THREADS - 1) as u64);
        assert_eq!(manager.active_count(), 0);
    }
}

// ============================================================================
// Version Monotonicity
// ============================================================================

#[test]
fn test_commit_versions_unique_and_dense() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let manager = Arc::new(TransactionManager::new());
    let map = trie(&manager);
    let versions = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let map = map.clone();
            let versions = Arc::clone(&versions);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let txn = manager.begin();
                    map.put(&txn, &format!("ns{}.k{}", t, i), i as u64).unwrap();
                    let version = txn.commit().unwrap();
                    versions.lock().push(version);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let versions = versions.lock();
    let unique: HashSet<u64> = versions.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * PER_THREAD);
    assert_eq!(*versions.iter().max().unwrap(), (THREADS * PER_THREAD) as u64);
    assert_eq!(manager.current_version(), (THREADS * PER_THREAD) as u64);
}

// ============================================================================
// Snapshot Isolation
// ============================================================================

#[test]
fn test_readers_never_see_partial_commit() {
    // Writers move one unit between two keys per transaction; the sum is
    // constant in every snapshot.
    const TRANSFERS: usize = 300;

    let manager = Arc::new(TransactionManager::new());
    let map = flat_map(&manager);
    let seed = manager.begin();
    map.put(&seed, "acct.a", 1_000).unwrap();
    map.put(&seed, "acct.b", 1_000).unwrap();
    seed.commit().unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let manager = Arc::clone(&manager);
        let map = map.clone();
        thread::spawn(move || {
            let mut committed = 0;
            while committed < TRANSFERS {
                let txn = manager.begin();
                let a = map.get(&txn, "acct.a").unwrap().unwrap();
                let b = map.get(&txn, "acct.b").unwrap().unwrap();
                map.put(&txn, "acct.a", a - 1).unwrap();
                map.put(&txn, "acct.b", b + 1).unwrap();
                if txn.commit().is_ok() {
                    committed += 1;
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let map = map.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0;
                loop {
                    let txn = manager.begin();
                    let sum: u64 = map.range(&txn, "acct.").unwrap().map(|(_, v)| v).sum();
                    assert_eq!(sum, 2_000);
                    txn.commit().unwrap();
                    observed += 1;
                    if done.load(Ordering::Acquire) {
                        break;
                    }
                }
                observed
            })
        })
        .collect();

    writer.join().unwrap();
    done.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }

    let txn = manager.begin();
    assert_eq!(map.get(&txn, "acct.b").unwrap(), Some(1_000 + TRANSFERS as u64));
}

// ============================================================================
// Garbage collection under load
// ============================================================================

#[test]
fn test_gc_keeps_open_snapshots_readable() {
    let manager = Arc::new(TransactionManager::new());
    let map = trie(&manager);

    let seed = manager.begin();
    for i in 0..64u64 {
        map.put(&seed, &format!("ns.k{:02}", i), i).unwrap();
    }
    seed.commit().unwrap();

    // Pinned reader at the seeded snapshot
    let pinned = manager.begin();
    let pinned_view = pinned.read_view();

    let churn = {
        let manager = Arc::clone(&manager);
        let map = map.clone();
        thread::spawn(move || {
            for round in 0..20u64 {
                let txn = manager.begin();
                for i in 0..64u64 {
                    let key = format!("ns.k{:02}", i);
                    if (i + round) % 3 == 0 {
                        let _ = map.remove(&txn, &key);
                    } else {
                        map.put(&txn, &key, i * 1000 + round).unwrap();
                    }
                }
                txn.commit().unwrap();
            }
        })
    };

    let collector = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for _ in 0..50 {
                manager.collect_garbage();
                thread::yield_now();
            }
        })
    };

    churn.join().unwrap();
    collector.join().unwrap();
    manager.collect_garbage();

    let values: Vec<u64> = map.range_at("ns.", pinned_view).map(|(_, v)| v).collect();
    assert_eq!(values, (0..64).collect::<Vec<u64>>());
    assert_eq!(map.get(&pinned, "ns.k07").unwrap(), Some(7));

    pinned.rollback();
    let report = manager.collect_garbage();
    assert_eq!(report.horizon, manager.current_version());
    assert!(report.versions_pruned > 0);
    assert_eq!(map.get_at("ns.k00", ReadView::committed(1)), None);
}
