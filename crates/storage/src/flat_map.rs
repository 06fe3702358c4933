//! Sorted-vector map with transaction-aware entries
//!
//! [`FlatIndex`] keeps `(key handle, entry slot)` pairs sorted by the
//! configured comparator and is searched by binary search. It backs both
//! [`TxnFlatMap`] and the burst nodes of the trie.
//!
//! # Locking
//!
//! Lookups and staging on existing keys hold the latch shared. A new key
//! is interned first, then inserted under the exclusive latch after a
//! second lookup, since another writer may have added it meanwhile.
//!
//! Garbage collection holds the latch exclusive while it unlinks vacant
//! entries. Readers only hold entry slot ids under the latch, so the pass
//! retires unlinked slots at its own horizon and reclaims them before
//! releasing the latch.

use std::cmp::Ordering;
use strata_core::{KeyComparator, ReadView, StrataResult};
use tracing::debug;

use crate::arena::{Allocators, SlotId, StrRef, StringsReader};
use crate::latch::SharedLatch;
use crate::range::Range;
use crate::store::{self, GcStats, StoreStats, VersionedStore};
use crate::version::{Entry, TxnAware};

/// Key handle plus the entry it indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSlot {
    /// Key bytes in the string arena
    pub key: StrRef,
    /// Entry in the entry arena
    pub entry: SlotId,
}

/// Sorted vector of index slots
#[derive(Debug, Default)]
pub struct FlatIndex {
    slots: Vec<IndexSlot>,
}

impl FlatIndex {
    /// Empty index
    pub fn new() -> Self {
        FlatIndex { slots: Vec::new() }
    }

    /// Build from slots already sorted by `order`
    pub fn from_sorted(slots: Vec<IndexSlot>) -> Self {
        FlatIndex { slots }
    }

    /// Binary search for `key`
    pub fn search(
        &self,
        key: &[u8],
        strings: &StringsReader<'_>,
        order: &dyn KeyComparator,
    ) -> Result<usize, usize> {
        self.slots
            .binary_search_by(|slot| order.compare(strings.bytes(slot.key), key))
    }

    /// Slot for `key`, if indexed
    pub fn find(
        &self,
        key: &[u8],
        strings: &StringsReader<'_>,
        order: &dyn KeyComparator,
    ) -> Option<IndexSlot> {
        self.search(key, strings, order)
            .ok()
            .map(|position| self.slots[position])
    }

    /// Position of the first key not less than `from`
    pub fn lower_bound(
        &self,
        from: &[u8],
        strings: &StringsReader<'_>,
        order: &dyn KeyComparator,
    ) -> usize {
        self.slots
            .partition_point(|slot| order.compare(strings.bytes(slot.key), from) == Ordering::Less)
    }

    /// Position of the first key greater than `after`
    pub fn upper_bound(
        &self,
        after: &[u8],
        strings: &StringsReader<'_>,
        order: &dyn KeyComparator,
    ) -> usize {
        self.slots
            .partition_point(|slot| order.compare(strings.bytes(slot.key), after) != Ordering::Greater)
    }

    /// Insert at a position returned by [`FlatIndex::search`]
    pub fn insert(&mut self, position: usize, slot: IndexSlot) {
        self.slots.insert(position, slot);
    }

    /// Keep only the slots matching `keep`
    pub fn retain(&mut self, keep: impl FnMut(&IndexSlot) -> bool) {
        self.slots.retain(keep);
    }

    /// Slots in order
    pub fn slots(&self) -> &[IndexSlot] {
        &self.slots
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Ordered map over a single sorted index
pub struct TxnFlatMap<V> {
    index: SharedLatch<FlatIndex>,
    alloc: Allocators<V>,
    order: &'static dyn KeyComparator,
}

impl<V> TxnFlatMap<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Empty map drawing from `alloc`, ordered by `order`
    pub fn new(alloc: Allocators<V>, order: &'static dyn KeyComparator) -> Self {
        TxnFlatMap {
            index: SharedLatch::new(FlatIndex::new()),
            alloc,
            order,
        }
    }

    /// Comparator in use
    pub fn order(&self) -> &'static dyn KeyComparator {
        self.order
    }

    /// Lazy prefix range visible to `view`
    pub fn range(&self, prefix: &str, view: ReadView) -> Range<'_, V> {
        Range::new(self, prefix, view)
    }

    /// Number of index entries, invisible ones included
    pub fn len(&self) -> usize {
        self.index.shared().len()
    }

    /// Whether the index holds no entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locate(&self, key: &str) -> Option<SlotId> {
        let index = self.index.shared();
        let strings = self.alloc.strings.read();
        index
            .find(key.as_bytes(), &strings, self.order)
            .map(|slot| slot.entry)
    }

    fn stage(&self, key: &str, txn_id: u64, value: Option<V>) -> StrataResult<()> {
        {
            let index = self.index.shared();
            let found = {
                let strings = self.alloc.strings.read();
                index.find(key.as_bytes(), &strings, self.order)
            };
            if let Some(slot) = found {
                return store::stage_on(&self.alloc, slot.entry, txn_id, value);
            }
        }

        let handle = self.alloc.strings.intern(key.as_bytes())?;
        let mut index = self.index.exclusive();
        let searched = {
            let strings = self.alloc.strings.read();
            index.search(key.as_bytes(), &strings, self.order)
        };
        match searched {
            Ok(position) => {
                let slot = index.slots()[position];
                store::stage_on(&self.alloc, slot.entry, txn_id, value)
            }
            Err(position) => {
                let mut entry = Entry::new(handle);
                entry.stage(txn_id, value);
                let id = self.alloc.entries.allocate(entry)?;
                index.insert(
                    position,
                    IndexSlot {
                        key: handle,
                        entry: id,
                    },
                );
                Ok(())
            }
        }
    }
}

impl<V> VersionedStore<V> for TxnFlatMap<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str, view: ReadView) -> Option<V> {
        let index = self.index.shared();
        let slot = {
            let strings = self.alloc.strings.read();
            index.find(key.as_bytes(), &strings, self.order)?
        };
        store::visible_value(&self.alloc, slot.entry, &view)
    }

    fn put(&self, key: &str, value: V, txn_id: u64) -> StrataResult<()> {
        self.stage(key, txn_id, Some(value))
    }

    fn remove(&self, key: &str, txn_id: u64) -> StrataResult<()> {
        self.stage(key, txn_id, None)
    }

    fn publish(&self, key: &str, txn_id: u64, commit_version: u64) -> bool {
        let _index = self.index.shared();
        match self.locate(key) {
            Some(slot) => store::publish_on(&self.alloc, slot, txn_id, commit_version),
            None => false,
        }
    }

    fn discard(&self, key: &str, txn_id: u64) -> bool {
        let _index = self.index.shared();
        match self.locate(key) {
            Some(slot) => store::discard_on(&self.alloc, slot, txn_id),
            None => false,
        }
    }

    fn last_modified(&self, key: &str) -> Option<u64> {
        let _index = self.index.shared();
        let slot = self.locate(key)?;
        store::last_modified_on(&self.alloc, slot)
    }

    fn scan(
        &self,
        prefix: &str,
        after: Option<&str>,
        view: ReadView,
        limit: usize,
    ) -> Vec<(String, V)> {
        let index = self.index.shared();
        let strings = self.alloc.strings.read();
        let entries = self.alloc.entries.read();

        let mut start = index.lower_bound(prefix.as_bytes(), &strings, self.order);
        if let Some(after) = after {
            start = start.max(index.upper_bound(after.as_bytes(), &strings, self.order));
        }

        let mut page = Vec::new();
        for slot in &index.slots()[start.min(index.len())..] {
            if page.len() >= limit {
                break;
            }
            let key = strings.bytes(slot.key);
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let value = entries
                .get(slot.entry)
                .and_then(|entry| entry.visible(&view))
                .and_then(|record| record.value.clone());
            if let Some(value) = value {
                page.push((strings.to_string(slot.key), value));
            }
        }
        page
    }

    fn collect_garbage(&self, horizon: u64) -> GcStats {
        let mut index = self.index.exclusive();
        let mut stats = GcStats::default();
        let mut vacated = Vec::new();
        {
            let mut entries = self.alloc.entries.write();
            index.retain(|slot| match entries.get_mut(slot.entry) {
                Some(entry) => {
                    stats.versions_pruned += entry.prune(horizon);
                    if entry.is_vacant() {
                        vacated.push(slot.entry);
                        false
                    } else {
                        true
                    }
                }
                None => false,
            });
        }
        stats.entries_removed = vacated.len();
        for slot in vacated {
            self.alloc.entries.retire(slot, horizon);
        }
        self.alloc.entries.reclaim(horizon);
        drop(index);

        if stats.entries_removed > 0 || stats.versions_pruned > 0 {
            debug!(
                kind = "flat_map",
                horizon,
                versions_pruned = stats.versions_pruned,
                entries_removed = stats.entries_removed,
                "garbage collected"
            );
        }
        stats
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            kind: "flat_map",
            entries: self.len(),
            nodes: 0,
            bursts: 0,
            latch: self.index.stats(),
        }
    }
}
