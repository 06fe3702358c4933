//! Transaction manager
//!
//! Owns the process-wide counters: the next transaction id and the last
//! committed version. It also tracks the snapshot of every active
//! transaction, which bounds how far garbage collection may prune.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Transaction moves Active -> Validating (write-set lock held)
//! 2. Take the commit lock
//! 3. validate_write_set() + validate_read_set() against the snapshot
//! 4. IF conflicts: discard staged versions, Aborted, return Conflict
//! 5. commit_version = last_committed + 1
//! 6. Publish every staged version at commit_version
//! 7. Store last_committed = commit_version (VISIBILITY POINT)
//! 8. Release the commit lock, Validating -> Committed
//! ```
//!
//! Snapshots are read under the same lock, so a transaction never observes
//! half of a commit: either `last_committed` still excludes it or every
//! version it published is already in place.
//!
//! ## Snapshot Pins
//!
//! Reads at an explicit committed snapshot, outside any transaction, hold a
//! [`SnapshotPin`] for as long as they read. A pin counts toward the GC
//! horizon exactly like an active transaction's snapshot.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_core::{StrataError, StrataResult};
use strata_storage::GcStats;
use tracing::{debug, warn};

use crate::target::WriteTarget;
use crate::transaction::{Transaction, TxnState};
use crate::validation::{validate_read_set, validate_write_set};

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Committed,
    Aborted,
    Conflicted,
}

/// Lifetime counters of a manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Transactions begun
    pub started: u64,
    /// Transactions committed, read-only ones included
    pub committed: u64,
    /// Transactions aborted for any reason, conflicts included
    pub aborted: u64,
    /// Transactions aborted by a commit-time conflict
    pub conflicted: u64,
    /// Transactions currently active
    pub active: usize,
    /// Last committed version
    pub last_committed: u64,
}

/// Outcome of a garbage-collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Versions retired at or before this were pruned
    pub horizon: u64,
    /// Version records dropped across all targets
    pub versions_pruned: usize,
    /// Entries removed from their indices
    pub entries_removed: usize,
    /// Live targets visited
    pub targets: usize,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicted: AtomicU64,
}

/// Coordinates transaction begin, commit and garbage collection
///
/// Shared as `Arc<TransactionManager>`; every transaction holds a handle.
pub struct TransactionManager {
    /// Next transaction id
    next_txn_id: AtomicU64,

    /// Version of the last successful commit
    ///
    /// Monotonically increasing, advanced once per writing transaction.
    last_committed: AtomicU64,

    /// Serializes validation + publish and snapshot acquisition
    commit_lock: Mutex<()>,

    /// txn id -> snapshot of every active transaction
    active: DashMap<u64, u64>,

    /// pin id -> snapshot of every live [`SnapshotPin`]
    pins: DashMap<u64, u64>,

    /// Structures to visit during garbage collection
    targets: RwLock<Vec<Weak<dyn WriteTarget>>>,

    next_target_id: AtomicU64,
    counters: Counters,
}

impl TransactionManager {
    /// Manager starting from version zero
    pub fn new() -> Self {
        Self::with_version(0)
    }

    /// Manager whose first snapshot is `initial_version`
    pub fn with_version(initial_version: u64) -> Self {
        TransactionManager {
            next_txn_id: AtomicU64::new(1),
            last_committed: AtomicU64::new(initial_version),
            commit_lock: Mutex::new(()),
            active: DashMap::new(),
            pins: DashMap::new(),
            targets: RwLock::new(Vec::new()),
            next_target_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Begin a transaction at the current committed version
    pub fn begin(self: &Arc<Self>) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let snapshot = {
            let _commit = self.commit_lock.lock();
            let snapshot = self.last_committed.load(Ordering::Acquire);
            self.active.insert(id, snapshot);
            snapshot
        };
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        debug!(txn_id = id, snapshot, "transaction started");
        Transaction::new(id, snapshot, Arc::clone(self))
    }

    /// Version of the last successful commit
    pub fn current_version(&self) -> u64 {
        self.last_committed.load(Ordering::Acquire)
    }

    /// Number of transactions currently active
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of live snapshot pins
    pub fn pinned_count(&self) -> usize {
        self.pins.len()
    }

    /// Keep `snapshot` readable until the returned guard is dropped
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `snapshot` is newer than the last commit, or older
    /// than the GC horizon (collection may already have pruned it).
    pub fn pin(self: &Arc<Self>, snapshot: u64) -> StrataResult<SnapshotPin> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        {
            let _commit = self.commit_lock.lock();
            let last = self.last_committed.load(Ordering::Acquire);
            if snapshot > last {
                return Err(StrataError::invalid_input(format!(
                    "snapshot {} is ahead of the last commit {}",
                    snapshot, last
                )));
            }
            let horizon = self.horizon_locked();
            if snapshot < horizon {
                return Err(StrataError::invalid_input(format!(
                    "snapshot {} is older than the gc horizon {}",
                    snapshot, horizon
                )));
            }
            self.pins.insert(id, snapshot);
        }
        Ok(SnapshotPin {
            id,
            snapshot,
            manager: Arc::clone(self),
        })
    }

    /// Oldest snapshot any active transaction or pin may still read at
    ///
    /// Equal to the last committed version when nothing is active.
    pub fn gc_horizon(&self) -> u64 {
        let _commit = self.commit_lock.lock();
        self.horizon_locked()
    }

    fn horizon_locked(&self) -> u64 {
        let oldest = self
            .active
            .iter()
            .map(|entry| *entry.value())
            .chain(self.pins.iter().map(|entry| *entry.value()))
            .min();
        oldest.unwrap_or_else(|| self.last_committed.load(Ordering::Acquire))
    }

    /// Allocate an identifier for a new target
    pub fn allocate_target_id(&self) -> u64 {
        self.next_target_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Include `target` in garbage collection for as long as it lives
    pub fn register(&self, target: Weak<dyn WriteTarget>) {
        self.targets.write().push(target);
    }

    /// Lifetime counters
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            started: self.counters.started.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            aborted: self.counters.aborted.load(Ordering::Relaxed),
            conflicted: self.counters.conflicted.load(Ordering::Relaxed),
            active: self.active.len(),
            last_committed: self.current_version(),
        }
    }

    /// Validate and publish a transaction's write set
    ///
    /// Called with the transaction's state locked and in `Validating`.
    /// On error nothing has been published; the caller discards.
    pub(crate) fn commit_writes(
        &self,
        txn_id: u64,
        snapshot: u64,
        state: &TxnState,
    ) -> StrataResult<u64> {
        if state.writes.is_empty() {
            return Ok(snapshot);
        }

        let _commit = self.commit_lock.lock();

        let mut result = validate_write_set(snapshot, state.write_items());
        result.merge(validate_read_set(snapshot, state.read_items()));
        let conflicts = result.conflict_count();
        if let Err(err) = result.into_result() {
            debug!(txn_id, snapshot, conflicts, "commit validation failed");
            return Err(err);
        }

        let commit_version = self.last_committed.load(Ordering::Acquire) + 1;
        for (target, key) in state.write_items() {
            if !target.publish(key, txn_id, commit_version) {
                warn!(
                    txn_id,
                    target = target.name(),
                    key,
                    "staged version missing at publish"
                );
            }
        }
        self.last_committed.store(commit_version, Ordering::Release);
        Ok(commit_version)
    }

    pub(crate) fn finish(&self, txn_id: u64, outcome: Outcome) {
        self.active.remove(&txn_id);
        match outcome {
            Outcome::Committed => {
                self.counters.committed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Aborted => {
                self.counters.aborted.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Conflicted => {
                self.counters.aborted.fetch_add(1, Ordering::Relaxed);
                self.counters.conflicted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Prune versions no active or future snapshot can see
    ///
    /// Visits every registered target that is still alive and forgets the
    /// ones that were dropped.
    pub fn collect_garbage(&self) -> GcReport {
        let horizon = self.gc_horizon();

        let live: Vec<Arc<dyn WriteTarget>> = {
            let mut targets = self.targets.write();
            targets.retain(|target| target.strong_count() > 0);
            targets.iter().filter_map(Weak::upgrade).collect()
        };

        let stats = live
            .iter()
            .fold(GcStats::default(), |acc, target| {
                acc.merge(target.collect_garbage(horizon))
            });

        let report = GcReport {
            horizon,
            versions_pruned: stats.versions_pruned,
            entries_removed: stats.entries_removed,
            targets: live.len(),
        };
        if report.versions_pruned > 0 || report.entries_removed > 0 {
            debug!(
                horizon,
                versions_pruned = report.versions_pruned,
                entries_removed = report.entries_removed,
                targets = report.targets,
                "garbage collected"
            );
        }
        report
    }
}

/// Guard holding a committed snapshot above the GC horizon
///
/// Obtained from [`TransactionManager::pin`]; released on drop.
pub struct SnapshotPin {
    id: u64,
    snapshot: u64,
    manager: Arc<TransactionManager>,
}

impl SnapshotPin {
    /// Pinned snapshot
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        self.manager.pins.remove(&self.id);
    }
}

impl std::fmt::Debug for SnapshotPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPin")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("last_committed", &self.current_version())
            .field("active", &self.active.len())
            .field("pins", &self.pins.len())
            .field("targets", &self.targets.read().len())
            .finish()
    }
}
