//! Transaction-managed map
//!
//! [`TxnMap`] binds a [`VersionedStore`] to the transaction subsystem.
//! Reads go through the transaction's view; writes are staged while the
//! transaction's write-set lock is held and recorded in its write set so
//! commit can publish them and rollback can discard them.
//!
//! ```ignore
//! let map = TxnMap::new(&manager, "datasets", Box::new(BurstTrie::new(alloc, 32)));
//! let txn = manager.begin();
//! map.insert(&txn, "ns1.ds1", value)?;
//! txn.commit()?;
//! ```

use std::fmt;
use std::sync::Arc;
use strata_core::{ReadView, StrataError, StrataResult};
use strata_storage::{GcStats, Range, StoreStats, VersionedStore, DEFAULT_RANGE_PAGE_SIZE};

use crate::manager::TransactionManager;
use crate::target::WriteTarget;
use crate::transaction::{Transaction, WriteKind};
use crate::validation::modified_after;

struct MapTarget<V> {
    id: u64,
    name: String,
    store: Box<dyn VersionedStore<V>>,
}

impl<V> WriteTarget for MapTarget<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn target_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self, key: &str) -> Option<u64> {
        self.store.last_modified(key)
    }

    fn publish(&self, key: &str, txn_id: u64, commit_version: u64) -> bool {
        self.store.publish(key, txn_id, commit_version)
    }

    fn discard(&self, key: &str, txn_id: u64) -> bool {
        self.store.discard(key, txn_id)
    }

    fn collect_garbage(&self, horizon: u64) -> GcStats {
        self.store.collect_garbage(horizon)
    }
}

/// Versioned map whose every operation runs under a [`Transaction`]
///
/// Cheap to clone; clones share the underlying structure.
pub struct TxnMap<V> {
    target: Arc<MapTarget<V>>,
    manager: Arc<TransactionManager>,
    page_size: usize,
}

impl<V> TxnMap<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wrap `store` and register it with `manager` for garbage collection
    pub fn new(
        manager: &Arc<TransactionManager>,
        name: impl Into<String>,
        store: Box<dyn VersionedStore<V>>,
    ) -> Self {
        let target = Arc::new(MapTarget {
            id: manager.allocate_target_id(),
            name: name.into(),
            store,
        });
        let weak = Arc::downgrade(&target);
        manager.register(weak);
        TxnMap {
            target,
            manager: Arc::clone(manager),
            page_size: DEFAULT_RANGE_PAGE_SIZE,
        }
    }

    /// Override the range page size (at least one)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Map name
    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Identifier assigned by the manager
    pub fn target_id(&self) -> u64 {
        self.target.id
    }

    /// Manager this map is registered with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    fn erased(&self) -> Arc<dyn WriteTarget> {
        self.target.clone()
    }

    fn store(&self) -> &dyn VersionedStore<V> {
        self.target.store.as_ref()
    }

    fn check(&self, txn: &Transaction) -> StrataResult<()> {
        if !Arc::ptr_eq(txn.manager(), &self.manager) {
            return Err(StrataError::invalid_input(format!(
                "transaction {} belongs to another manager than map '{}'",
                txn.id(),
                self.name()
            )));
        }
        txn.ensure_active()
    }

    /// Value of `key` visible to `txn`
    pub fn get(&self, txn: &Transaction, key: &str) -> StrataResult<Option<V>> {
        self.check(txn)?;
        Ok(self.store().get(key, txn.read_view()))
    }

    /// Like [`get`](Self::get), and make the commit of `txn` depend on
    /// `key` not changing after its snapshot
    pub fn get_tracked(&self, txn: &Transaction, key: &str) -> StrataResult<Option<V>> {
        self.check(txn)?;
        txn.track_read(&self.erased(), key)?;
        Ok(self.store().get(key, txn.read_view()))
    }

    /// Whether `key` has a value visible to `txn`
    pub fn contains(&self, txn: &Transaction, key: &str) -> StrataResult<bool> {
        Ok(self.get(txn, key)?.is_some())
    }

    /// Stage `value` for `key`
    pub fn put(&self, txn: &Transaction, key: &str, value: V) -> StrataResult<()> {
        self.check(txn)?;
        let store = self.store();
        txn.stage(&self.erased(), key, WriteKind::Put, |txn_id| {
            store.put(key, value, txn_id)
        })
    }

    /// Stage `value` for `key` unless a value is already visible
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `txn` can see a value for `key`.
    pub fn insert(&self, txn: &Transaction, key: &str, value: V) -> StrataResult<()> {
        self.check(txn)?;
        let store = self.store();
        let view = txn.read_view();
        txn.stage(&self.erased(), key, WriteKind::Put, |txn_id| {
            if store.get(key, view).is_some() {
                return Err(StrataError::already_exists("key", key));
            }
            store.put(key, value, txn_id)
        })
    }

    /// Stage the removal of `key`, returning the value it replaces
    ///
    /// # Errors
    ///
    /// `NotFound` if `txn` cannot see a value for `key`.
    pub fn remove(&self, txn: &Transaction, key: &str) -> StrataResult<V> {
        self.check(txn)?;
        let store = self.store();
        let view = txn.read_view();
        txn.stage(&self.erased(), key, WriteKind::Remove, |txn_id| {
            let previous = store
                .get(key, view)
                .ok_or_else(|| StrataError::not_found("key", key))?;
            store.remove(key, txn_id)?;
            Ok(previous)
        })
    }

    /// Fail with `Conflict` if `key` was committed after `txn`'s snapshot
    ///
    /// Lets callers abandon work early; commit-time validation still
    /// decides.
    pub fn modified_since(&self, txn: &Transaction, key: &str) -> StrataResult<()> {
        self.check(txn)?;
        match modified_after(&*self.target, key, txn.snapshot()) {
            Some(modified_at) => Err(StrataError::conflict(key, txn.snapshot(), modified_at)),
            None => Ok(()),
        }
    }

    /// Lazy range over the pairs under `prefix` visible to `txn`
    pub fn range(&self, txn: &Transaction, prefix: &str) -> StrataResult<Range<'_, V>> {
        self.check(txn)?;
        Ok(self.range_at(prefix, txn.read_view()))
    }

    /// Value of `key` at an explicit view, outside any transaction
    pub fn get_at(&self, key: &str, view: ReadView) -> Option<V> {
        self.store().get(key, view)
    }

    /// Lazy range at an explicit view, outside any transaction
    pub fn range_at(&self, prefix: &str, view: ReadView) -> Range<'_, V> {
        Range::new(self.store(), prefix, view).with_page_size(self.page_size)
    }

    /// Shape counters of the underlying structure
    pub fn stats(&self) -> StoreStats {
        self.store().stats()
    }
}

impl<V> Clone for TxnMap<V> {
    fn clone(&self) -> Self {
        TxnMap {
            target: Arc::clone(&self.target),
            manager: Arc::clone(&self.manager),
            page_size: self.page_size,
        }
    }
}

impl<V> fmt::Debug for TxnMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnMap")
            .field("id", &self.target.id)
            .field("name", &self.target.name)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionStatus;
    use strata_core::KeyOrder;
    use strata_storage::{Allocators, BurstTrie, TxnFlatMap};

    fn setup() -> (Arc<TransactionManager>, TxnMap<String>) {
        let manager = Arc::new(TransactionManager::new());
        let map = TxnMap::new(
            &manager,
            "test",
            Box::new(TxnFlatMap::new(
                Allocators::default(),
                KeyOrder::Qualified.comparator(),
            )),
        );
        (manager, map)
    }

    fn seed(manager: &Arc<TransactionManager>, map: &TxnMap<String>, key: &str, value: &str) {
        let txn = manager.begin();
        map.put(&txn, key, value.to_string()).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_read_your_writes_and_isolation() {
        let (manager, map) = setup();
        let writer = manager.begin();
        let reader = manager.begin();

        map.put(&writer, "ns.a", "1".to_string()).unwrap();
        assert_eq!(map.get(&writer, "ns.a").unwrap(), Some("1".to_string()));
        assert_eq!(map.get(&reader, "ns.a").unwrap(), None);

        writer.commit().unwrap();
        assert_eq!(map.get(&reader, "ns.a").unwrap(), None);
        let later = manager.begin();
        assert_eq!(map.get(&later, "ns.a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_insert_existing_fails() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.a", "1");
        let txn = manager.begin();
        let err = map.insert(&txn, "ns.a", "2".to_string()).unwrap_err();
        assert!(matches!(err, StrataError::AlreadyExists { .. }));
        assert!(txn.pending().is_empty());
    }

    #[test]
    fn test_remove_returns_previous() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.a", "1");
        let txn = manager.begin();
        assert_eq!(map.remove(&txn, "ns.a").unwrap(), "1");
        assert_eq!(map.get(&txn, "ns.a").unwrap(), None);
        assert!(map.remove(&txn, "ns.a").unwrap_err().is_not_found());
        assert_eq!(txn.pending().removes, 1);
        txn.commit().unwrap();

        let txn = manager.begin();
        assert!(!map.contains(&txn, "ns.a").unwrap());
    }

    #[test]
    fn test_rollback_discards() {
        let (manager, map) = setup();
        let txn = manager.begin();
        map.put(&txn, "ns.a", "1".to_string()).unwrap();
        txn.rollback();

        let txn = manager.begin();
        assert_eq!(map.get(&txn, "ns.a").unwrap(), None);
    }

    #[test]
    fn test_operations_on_committed_transaction() {
        let (manager, map) = setup();
        let txn = manager.begin();
        map.put(&txn, "ns.a", "1".to_string()).unwrap();
        txn.commit().unwrap();

        for err in [
            map.put(&txn, "ns.b", "2".to_string()).unwrap_err(),
            map.get(&txn, "ns.a").unwrap_err(),
            map.remove(&txn, "ns.a").unwrap_err(),
        ] {
            assert!(matches!(err, StrataError::InvalidState { .. }));
        }
        assert!(map.range(&txn, "ns.").is_err());
    }

    #[test]
    fn test_first_committer_wins() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.a", "0");
        let t1 = manager.begin();
        let t2 = manager.begin();
        map.put(&t1, "ns.a", "1".to_string()).unwrap();
        map.put(&t2, "ns.a", "2".to_string()).unwrap();

        t1.commit().unwrap();
        let err = t2.commit().unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(t2.status(), TransactionStatus::Aborted { .. }));
        assert_eq!(manager.metrics().conflicted, 1);

        let txn = manager.begin();
        assert_eq!(map.get(&txn, "ns.a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_modified_since() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.a", "0");
        let stale = manager.begin();
        seed(&manager, &map, "ns.a", "1");

        assert!(map.modified_since(&stale, "ns.a").unwrap_err().is_conflict());
        assert!(map.modified_since(&stale, "ns.b").is_ok());
        assert!(stale.is_active());
    }

    #[test]
    fn test_tracked_read_conflicts() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.parent", "p");
        let txn = manager.begin();
        assert!(map.get_tracked(&txn, "ns.parent").unwrap().is_some());
        map.put(&txn, "ns.child", "c".to_string()).unwrap();

        let other = manager.begin();
        map.remove(&other, "ns.parent").unwrap();
        other.commit().unwrap();

        assert!(txn.commit().unwrap_err().is_conflict());
    }

    #[test]
    fn test_foreign_transaction_rejected() {
        let (_, map) = setup();
        let other = Arc::new(TransactionManager::new());
        let txn = other.begin();
        assert!(matches!(
            map.get(&txn, "ns.a").unwrap_err(),
            StrataError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_range_over_trie() {
        let manager = Arc::new(TransactionManager::new());
        let map: TxnMap<u32> = TxnMap::new(
            &manager,
            "trie",
            Box::new(BurstTrie::new(Allocators::default(), 2)),
        )
        .with_page_size(2);

        let txn = manager.begin();
        for (i, key) in ["ns1.a", "ns1.b", "ns2.c", "ns1.c"].iter().enumerate() {
            map.put(&txn, key, i as u32).unwrap();
        }
        let own: Vec<String> = map.range(&txn, "ns1.").unwrap().map(|(k, _)| k).collect();
        assert_eq!(own, vec!["ns1.a", "ns1.b", "ns1.c"]);
        let version = txn.commit().unwrap();

        let committed: Vec<String> = map
            .range_at("ns1.", ReadView::committed(version))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(committed, own);
        assert_eq!(map.range_at("ns1.", ReadView::committed(0)).count(), 0);
    }

    #[test]
    fn test_gc_through_manager() {
        let (manager, map) = setup();
        seed(&manager, &map, "ns.a", "1");
        seed(&manager, &map, "ns.a", "2");
        let txn = manager.begin();
        map.remove(&txn, "ns.a").unwrap();
        txn.commit().unwrap();

        let report = manager.collect_garbage();
        assert_eq!(report.horizon, manager.current_version());
        assert_eq!(report.targets, 1);
        assert_eq!(report.versions_pruned, 2);
        assert_eq!(report.entries_removed, 1);
        assert_eq!(map.stats().entries, 0);
    }

    #[test]
    fn test_dropped_map_is_forgotten() {
        let (manager, map) = setup();
        drop(map);
        assert_eq!(manager.collect_garbage().targets, 0);
    }
}
