//! Versioned store abstraction
//!
//! [`VersionedStore`] is the seam between the ordered structures and the
//! transaction layer. The flat map and the burst trie both implement it;
//! the transaction-managed map only ever talks to `dyn VersionedStore`.

use strata_core::{ReadView, StrataError, StrataResult};

use crate::arena::{Allocators, SlotId};
use crate::latch::LatchStats;
use crate::version::TxnAware;

/// Result of one garbage-collection pass over a structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Version records dropped
    pub versions_pruned: usize,
    /// Entries unlinked from the index because they held no version
    pub entries_removed: usize,
}

impl GcStats {
    /// Sum of two passes
    pub fn merge(self, other: GcStats) -> GcStats {
        GcStats {
            versions_pruned: self.versions_pruned + other.versions_pruned,
            entries_removed: self.entries_removed + other.entries_removed,
        }
    }
}

/// Shape counters for a structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// "flat_map" or "burst_trie"
    pub kind: &'static str,
    /// Index entries, including ones no snapshot can see
    pub entries: usize,
    /// Trie nodes (zero for the flat map)
    pub nodes: usize,
    /// Nodes that switched to a sorted index
    pub bursts: usize,
    /// Latch traffic
    pub latch: LatchStats,
}

/// Ordered, multi-versioned key-value structure
///
/// Writes are staged per transaction and become visible to other readers
/// only once published at a commit version.
pub trait VersionedStore<V>: Send + Sync {
    /// Value visible to `view`
    fn get(&self, key: &str, view: ReadView) -> Option<V>;

    /// Stage `value` for `key` on behalf of `txn_id`
    fn put(&self, key: &str, value: V, txn_id: u64) -> StrataResult<()>;

    /// Stage a removal of `key` on behalf of `txn_id`
    fn remove(&self, key: &str, txn_id: u64) -> StrataResult<()>;

    /// Commit `txn_id`'s pending version of `key` at `commit_version`
    fn publish(&self, key: &str, txn_id: u64, commit_version: u64) -> bool;

    /// Drop `txn_id`'s pending version of `key`
    fn discard(&self, key: &str, txn_id: u64) -> bool;

    /// Commit version of the latest committed change to `key`
    fn last_modified(&self, key: &str) -> Option<u64>;

    /// Up to `limit` visible pairs whose key starts with `prefix`, in
    /// comparator order, strictly after `after` when given
    fn scan(&self, prefix: &str, after: Option<&str>, view: ReadView, limit: usize)
        -> Vec<(String, V)>;

    /// Prune versions no snapshot at or after `horizon` can see
    fn collect_garbage(&self, horizon: u64) -> GcStats;

    /// Shape counters
    fn stats(&self) -> StoreStats;
}

// Entry-level operations shared by both structures. Callers hold the
// structure latch (shared at least) so `slot` cannot be reclaimed.

pub(crate) fn visible_value<V: Clone>(
    alloc: &Allocators<V>,
    slot: SlotId,
    view: &ReadView,
) -> Option<V> {
    let entries = alloc.entries.read();
    entries
        .get(slot)
        .and_then(|entry| entry.visible(view))
        .and_then(|record| record.value.clone())
}

pub(crate) fn stage_on<V>(
    alloc: &Allocators<V>,
    slot: SlotId,
    txn_id: u64,
    value: Option<V>,
) -> StrataResult<()> {
    let mut entries = alloc.entries.write();
    let entry = entries
        .get_mut(slot)
        .ok_or_else(|| StrataError::internal("index slot points at a freed entry"))?;
    entry.stage(txn_id, value);
    Ok(())
}

pub(crate) fn publish_on<V>(
    alloc: &Allocators<V>,
    slot: SlotId,
    txn_id: u64,
    commit_version: u64,
) -> bool {
    alloc
        .entries
        .write()
        .get_mut(slot)
        .map_or(false, |entry| entry.publish(txn_id, commit_version))
}

pub(crate) fn discard_on<V>(alloc: &Allocators<V>, slot: SlotId, txn_id: u64) -> bool {
    alloc
        .entries
        .write()
        .get_mut(slot)
        .map_or(false, |entry| entry.discard(txn_id))
}

pub(crate) fn last_modified_on<V>(alloc: &Allocators<V>, slot: SlotId) -> Option<u64> {
    alloc
        .entries
        .read()
        .get(slot)
        .and_then(|entry| entry.last_modified())
}
