//! Transactions
//!
//! A [`Transaction`] is a unit of work: an identifier, a read snapshot, a
//! write set and, optionally, a set of read dependencies. Writes are staged
//! in the underlying structures as pending versions tagged with the
//! transaction id, so they are invisible to everyone else until commit
//! publishes them.
//!
//! The write-set lock (`state`) is held while a managed map stages a
//! version, which keeps the bookkeeping and the structure in step.
//!
//! # Lock order
//!
//! Transaction state, then the manager's commit lock, then structure locks.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::{ByReferent, ReadView, StrataError, StrataResult};
use tracing::{debug, warn};

use crate::manager::{Outcome, TransactionManager};
use crate::target::WriteTarget;

/// Summary of pending operations that would be rolled back on abort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Number of pending put operations
    pub puts: usize,
    /// Number of pending remove operations
    pub removes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.removes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Aborted` (conflict detected)
/// - `Active` → `Aborted` (rollback or drop)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed {
        /// Commit version, or the snapshot for a read-only transaction
        version: u64,
    },
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl TransactionStatus {
    /// Whether the transaction still accepts operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Active)
    }

    /// Whether the transaction has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed { .. } | TransactionStatus::Aborted { .. }
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Validating => write!(f, "validating"),
            TransactionStatus::Committed { version } => write!(f, "committed at {}", version),
            TransactionStatus::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// Kind of a staged write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// New or replacement value
    Put,
    /// Tombstone
    Remove,
}

/// Write- and read-set key: target id plus key text
pub(crate) type SetKey = (u64, ByReferent<Arc<str>>);

pub(crate) struct WriteRecord {
    pub(crate) target: Arc<dyn WriteTarget>,
    pub(crate) kind: WriteKind,
}

pub(crate) struct TxnState {
    pub(crate) status: TransactionStatus,
    pub(crate) writes: BTreeMap<SetKey, WriteRecord>,
    pub(crate) reads: BTreeMap<SetKey, Arc<dyn WriteTarget>>,
}

impl TxnState {
    fn new() -> Self {
        TxnState {
            status: TransactionStatus::Active,
            writes: BTreeMap::new(),
            reads: BTreeMap::new(),
        }
    }

    pub(crate) fn write_items(&self) -> impl Iterator<Item = (&dyn WriteTarget, &str)> {
        self.writes
            .iter()
            .map(|((_, key), record)| (record.target.as_ref(), &**key))
    }

    pub(crate) fn read_items(&self) -> impl Iterator<Item = (&dyn WriteTarget, &str)> {
        self.reads
            .iter()
            .map(|((_, key), target)| (target.as_ref(), &**key))
    }
}

/// Unit of work with snapshot isolation
///
/// Created by [`TransactionManager::begin`]. Terminated exactly once by
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); every later
/// operation fails with `InvalidState`. A transaction dropped while still
/// active is rolled back.
pub struct Transaction {
    id: u64,
    snapshot: u64,
    manager: Arc<TransactionManager>,
    state: Mutex<TxnState>,
    started: Instant,
}

impl Transaction {
    pub(crate) fn new(id: u64, snapshot: u64, manager: Arc<TransactionManager>) -> Self {
        Transaction {
            id,
            snapshot,
            manager,
            state: Mutex::new(TxnState::new()),
            started: Instant::now(),
        }
    }

    /// Transaction identifier
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Highest commit version visible to this transaction
    #[inline]
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    /// Visibility used for reads: the snapshot plus this transaction's own
    /// pending writes
    #[inline]
    pub fn read_view(&self) -> ReadView {
        ReadView::for_txn(self.id, self.snapshot)
    }

    /// Manager that created this transaction
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status.clone()
    }

    /// Whether the transaction still accepts operations
    pub fn is_active(&self) -> bool {
        self.state.lock().status.is_active()
    }

    /// Fail with `InvalidState` unless the transaction is active
    pub fn ensure_active(&self) -> StrataResult<()> {
        let state = self.state.lock();
        self.check_active(&state.status)
    }

    fn check_active(&self, status: &TransactionStatus) -> StrataResult<()> {
        if status.is_active() {
            Ok(())
        } else {
            Err(StrataError::invalid_state(self.id, status.to_string()))
        }
    }

    /// Staged operations that a rollback would discard
    pub fn pending(&self) -> PendingOperations {
        let state = self.state.lock();
        let mut pending = PendingOperations::default();
        for record in state.writes.values() {
            match record.kind {
                WriteKind::Put => pending.puts += 1,
                WriteKind::Remove => pending.removes += 1,
            }
        }
        pending
    }

    /// Number of recorded read dependencies
    pub fn read_dependencies(&self) -> usize {
        self.state.lock().reads.len()
    }

    /// Time since begin
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the transaction has been open longer than `timeout`
    ///
    /// Timeouts are the caller's policy: an expired transaction is still
    /// usable until the caller rolls it back.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.elapsed() > timeout
    }

    /// Stage a write while holding the write-set lock
    ///
    /// `apply` receives the transaction id and performs the structural
    /// mutation; the write is recorded only if it succeeds.
    pub(crate) fn stage<T, F>(
        &self,
        target: &Arc<dyn WriteTarget>,
        key: &str,
        kind: WriteKind,
        apply: F,
    ) -> StrataResult<T>
    where
        F: FnOnce(u64) -> StrataResult<T>,
    {
        let mut state = self.state.lock();
        self.check_active(&state.status)?;
        let output = apply(self.id)?;
        state.writes.insert(
            (target.target_id(), ByReferent(Arc::from(key))),
            WriteRecord {
                target: Arc::clone(target),
                kind,
            },
        );
        Ok(output)
    }

    /// Record that the outcome of this transaction depends on `key`
    pub(crate) fn track_read(&self, target: &Arc<dyn WriteTarget>, key: &str) -> StrataResult<()> {
        let mut state = self.state.lock();
        self.check_active(&state.status)?;
        state
            .reads
            .entry((target.target_id(), ByReferent(Arc::from(key))))
            .or_insert_with(|| Arc::clone(target));
        Ok(())
    }

    /// Commit the transaction
    ///
    /// Validates the write set and read dependencies against transactions
    /// that committed after this snapshot, then publishes every staged
    /// version at a single new commit version. A read-only transaction
    /// returns its snapshot without allocating a version.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the transaction is not active
    /// - `Conflict` if validation fails; the transaction is then aborted
    pub fn commit(&self) -> StrataResult<u64> {
        let mut state = self.state.lock();
        self.check_active(&state.status)?;
        state.status = TransactionStatus::Validating;

        match self.manager.commit_writes(self.id, self.snapshot, &state) {
            Ok(version) => {
                state.status = TransactionStatus::Committed { version };
                let writes = state.writes.len();
                state.writes.clear();
                state.reads.clear();
                self.manager.finish(self.id, Outcome::Committed);
                debug!(
                    txn_id = self.id,
                    snapshot = self.snapshot,
                    commit_version = version,
                    writes,
                    "transaction committed"
                );
                Ok(version)
            }
            Err(err) => {
                let outcome = if err.is_conflict() {
                    Outcome::Conflicted
                } else {
                    Outcome::Aborted
                };
                Self::abort_locked(self.id, &self.manager, &mut state, err.to_string(), outcome);
                debug!(
                    txn_id = self.id,
                    snapshot = self.snapshot,
                    error = %err,
                    "transaction commit failed"
                );
                Err(err)
            }
        }
    }

    /// Discard the write set
    ///
    /// Never fails; rolling back a transaction that already ended is a
    /// no-op.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        if state.status.is_active() {
            let discarded = state.writes.len();
            Self::abort_locked(
                self.id,
                &self.manager,
                &mut state,
                "rolled back".to_string(),
                Outcome::Aborted,
            );
            debug!(txn_id = self.id, discarded, "transaction rolled back");
        }
    }

    fn abort_locked(
        id: u64,
        manager: &TransactionManager,
        state: &mut TxnState,
        reason: String,
        outcome: Outcome,
    ) {
        for ((_, key), record) in &state.writes {
            record.target.discard(key, id);
        }
        state.writes.clear();
        state.reads.clear();
        state.status = TransactionStatus::Aborted { reason };
        manager.finish(id, outcome);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.status.is_active() {
            warn!(
                txn_id = self.id,
                pending = state.writes.len(),
                "transaction dropped while active, rolling back"
            );
            Self::abort_locked(
                self.id,
                &self.manager,
                state,
                "dropped while active".to_string(),
                Outcome::Aborted,
            );
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("status", &state.status)
            .field("writes", &state.writes.len())
            .field("reads", &state.reads.len())
            .finish()
    }
}
