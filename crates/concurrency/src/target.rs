//! Commit targets
//!
//! A [`WriteTarget`] is the type-erased face of a transaction-managed map.
//! Write sets hold targets rather than typed maps so one transaction can
//! span maps of different value types, and the manager can publish,
//! discard and collect garbage without knowing what they store.

use strata_storage::GcStats;

/// Structure a transaction can stage writes in
pub trait WriteTarget: Send + Sync {
    /// Identifier assigned by the manager at registration
    fn target_id(&self) -> u64;

    /// Human-readable name, used in logs
    fn name(&self) -> &str;

    /// Commit version of the latest committed change to `key`
    fn last_modified(&self, key: &str) -> Option<u64>;

    /// Make `txn_id`'s pending version of `key` current at `commit_version`
    fn publish(&self, key: &str, txn_id: u64, commit_version: u64) -> bool;

    /// Drop `txn_id`'s pending version of `key`
    fn discard(&self, key: &str, txn_id: u64) -> bool;

    /// Prune versions no snapshot at or after `horizon` can see
    fn collect_garbage(&self, horizon: u64) -> GcStats;
}

impl std::fmt::Debug for dyn WriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTarget")
            .field("id", &self.target_id())
            .field("name", &self.name())
            .finish()
    }
}
