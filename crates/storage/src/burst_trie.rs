//! Burst trie over qualified names
//!
//! Keys are split on `.`: every segment but the last selects a child node,
//! and the full key is stored in the entries of the node it ends at. A
//! single-segment key lives in the root's entries; `a.b.c` lives in the
//! entries of node `a -> b`.
//!
//! A node starts with a small unsorted entry list. Once that list grows
//! past the burst threshold it is converted, under the exclusive latch, into
//! a sorted [`FlatIndex`]. The conversion is one-way and changes neither
//! the visible contents nor the iteration order.
//!
//! Iteration is segment-wise (the qualified-name order): at every node the
//! entry whose last segment is `s` comes right before the subtree of child
//! `s`. A page seeks straight to the prefix and cursor in burst nodes and
//! in every node's child list, so paging a dense node costs one binary
//! search per page.
//!
//! # Garbage collection
//!
//! A pass runs under the exclusive latch. It prunes version chains, unlinks
//! vacant entries, then unlinks every non-root node left with neither
//! entries nor children. Unlinked entry and node slots are retired at the
//! pass's horizon and reclaimed in the same pass: readers only hold slot
//! ids while they hold the latch, so once the latch is released nothing can
//! reach them.

use smallvec::SmallVec;
use std::borrow::Cow;
use std::cmp::Ordering;
use strata_core::{
    compare_qualified, QualifiedNameOrder, ReadView, StrataError, StrataResult, SEGMENT_SEPARATOR,
};
use tracing::{debug, info};

use crate::arena::{Allocators, ObjectArena, Slab, SlotId, StrRef, StringsReader};
use crate::flat_map::{FlatIndex, IndexSlot};
use crate::latch::SharedLatch;
use crate::range::Range;
use crate::store::{self, GcStats, StoreStats, VersionedStore};
use crate::version::{Entry, TxnAware};

/// Direct entries a node holds before bursting
pub const DEFAULT_BURST_THRESHOLD: usize = 32;

static ORDER: QualifiedNameOrder = QualifiedNameOrder;

#[derive(Debug)]
enum NodeEntries {
    Direct(SmallVec<[IndexSlot; 4]>),
    Burst(FlatIndex),
}

impl NodeEntries {
    fn find(&self, key: &[u8], strings: &StringsReader<'_>) -> Option<IndexSlot> {
        match self {
            NodeEntries::Direct(slots) => slots
                .iter()
                .find(|slot| strings.bytes(slot.key) == key)
                .copied(),
            NodeEntries::Burst(index) => index.find(key, strings, &ORDER),
        }
    }

    /// Add a slot; returns true when this insert burst the node
    fn insert(&mut self, slot: IndexSlot, strings: &StringsReader<'_>, threshold: usize) -> bool {
        match self {
            NodeEntries::Direct(slots) => {
                slots.push(slot);
                if slots.len() <= threshold {
                    return false;
                }
                let mut sorted: Vec<IndexSlot> = slots.drain(..).collect();
                sorted.sort_by(|a, b| compare_qualified(strings.bytes(a.key), strings.bytes(b.key)));
                *self = NodeEntries::Burst(FlatIndex::from_sorted(sorted));
                true
            }
            NodeEntries::Burst(index) => {
                let position = match index.search(strings.bytes(slot.key), strings, &ORDER) {
                    Ok(position) | Err(position) => position,
                };
                index.insert(position, slot);
                false
            }
        }
    }

    /// Slots sorted by key, starting at the first one that may be at or
    /// past `prefix` and after `after`
    ///
    /// Direct lists are small and sorted on the fly; burst indices are
    /// sliced in place.
    fn ordered_from(
        &self,
        strings: &StringsReader<'_>,
        prefix: &[u8],
        after: Option<&[u8]>,
    ) -> Cow<'_, [IndexSlot]> {
        match self {
            NodeEntries::Direct(slots) => {
                let mut sorted = slots.to_vec();
                sorted.sort_by(|a, b| compare_qualified(strings.bytes(a.key), strings.bytes(b.key)));
                Cow::Owned(sorted)
            }
            NodeEntries::Burst(index) => {
                let mut start = index.lower_bound(prefix, strings, &ORDER);
                if let Some(after) = after {
                    start = start.max(index.upper_bound(after, strings, &ORDER));
                }
                Cow::Borrowed(&index.slots()[start.min(index.len())..])
            }
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&IndexSlot) -> bool) {
        match self {
            NodeEntries::Direct(slots) => slots.retain(|slot| keep(slot)),
            NodeEntries::Burst(index) => index.retain(keep),
        }
    }

    fn is_burst(&self) -> bool {
        matches!(self, NodeEntries::Burst(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            NodeEntries::Direct(slots) => slots.is_empty(),
            NodeEntries::Burst(index) => index.is_empty(),
        }
    }
}

#[derive(Debug)]
struct TrieNode {
    /// Children sorted by segment bytes
    children: Vec<(StrRef, SlotId)>,
    entries: NodeEntries,
}

impl TrieNode {
    fn new() -> Self {
        TrieNode {
            children: Vec::new(),
            entries: NodeEntries::Direct(SmallVec::new()),
        }
    }

    fn child_position(&self, segment: &[u8], strings: &StringsReader<'_>) -> Result<usize, usize> {
        self.children
            .binary_search_by(|(child, _)| strings.bytes(*child).cmp(segment))
    }

    fn child(&self, segment: &[u8], strings: &StringsReader<'_>) -> Option<SlotId> {
        self.child_position(segment, strings)
            .ok()
            .map(|position| self.children[position].1)
    }

    /// Position of the first child whose segment is not below `segment`
    fn children_from(&self, segment: &[u8], strings: &StringsReader<'_>) -> usize {
        self.children
            .partition_point(|(child, _)| strings.bytes(*child) < segment)
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct TrieShape {
    root: Option<SlotId>,
    entries: usize,
    bursts: usize,
}

/// Segments that select the node holding `key`
fn node_path(key: &[u8]) -> Vec<&[u8]> {
    let mut segments: Vec<&[u8]> = key.split(|byte| *byte == SEGMENT_SEPARATOR).collect();
    segments.pop();
    segments
}

fn last_segment(key: &[u8]) -> &[u8] {
    key.rsplit(|byte| *byte == SEGMENT_SEPARATOR)
        .next()
        .unwrap_or_default()
}

/// Segment of `bound` just below the node at `path`, if `bound` reaches
/// into that node
fn segment_floor<'b>(bound: &'b [u8], path: &[u8], at_root: bool) -> Option<&'b [u8]> {
    let rest = if at_root {
        bound
    } else {
        bound.strip_prefix(path)?.strip_prefix(&[SEGMENT_SEPARATOR])?
    };
    rest.split(|byte| *byte == SEGMENT_SEPARATOR).next()
}

/// Unlink the empty descendants of `id`, collecting them in `unlinked`
///
/// Returns whether `id` itself is left empty.
fn unlink_empty(
    nodes: &mut Slab<TrieNode>,
    id: SlotId,
    unlinked: &mut Vec<(SlotId, bool)>,
) -> bool {
    let children: Vec<SlotId> = match nodes.get(id) {
        Some(node) => node.children.iter().map(|(_, child)| *child).collect(),
        None => return false,
    };
    let mut keep = Vec::with_capacity(children.len());
    for child in children {
        let empty = unlink_empty(nodes, child, unlinked);
        if empty {
            let burst = nodes.get(child).map_or(false, |node| node.entries.is_burst());
            unlinked.push((child, burst));
        }
        keep.push(!empty);
    }
    let Some(node) = nodes.get_mut(id) else {
        return false;
    };
    let mut keep = keep.into_iter();
    node.children.retain(|_| keep.next().unwrap_or(true));
    node.is_empty()
}

fn descend(
    nodes: &Slab<TrieNode>,
    strings: &StringsReader<'_>,
    root: SlotId,
    path: &[&[u8]],
) -> Option<SlotId> {
    path.iter().try_fold(root, |current, segment| {
        nodes.get(current)?.child(segment, strings)
    })
}

/// Ordered map that splits keys on `.` into a trie of sorted nodes
pub struct BurstTrie<V> {
    shape: SharedLatch<TrieShape>,
    nodes: ObjectArena<TrieNode>,
    alloc: Allocators<V>,
    threshold: usize,
}

impl<V> BurstTrie<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Empty trie drawing from `alloc`
    ///
    /// A threshold of zero is treated as one.
    pub fn new(alloc: Allocators<V>, threshold: usize) -> Self {
        BurstTrie {
            shape: SharedLatch::new(TrieShape::default()),
            nodes: ObjectArena::new("trie_node"),
            alloc,
            threshold: threshold.max(1),
        }
    }

    /// Burst threshold in use
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of nodes that have burst
    pub fn burst_count(&self) -> usize {
        self.shape.shared().bursts
    }

    /// Number of entries, invisible ones included
    pub fn len(&self) -> usize {
        self.shape.shared().entries
    }

    /// Whether the trie holds no entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy prefix range visible to `view`
    pub fn range(&self, prefix: &str, view: ReadView) -> Range<'_, V> {
        Range::new(self, prefix, view)
    }

    fn locate(&self, shape: &TrieShape, key: &[u8]) -> Option<SlotId> {
        let root = shape.root?;
        let nodes = self.nodes.read();
        let strings = self.alloc.strings.read();
        let node = descend(&nodes, &strings, root, &node_path(key))?;
        nodes
            .get(node)?
            .entries
            .find(key, &strings)
            .map(|slot| slot.entry)
    }

    fn stage(&self, key: &str, txn_id: u64, value: Option<V>) -> StrataResult<()> {
        let bytes = key.as_bytes();
        {
            let shape = self.shape.shared();
            if let Some(slot) = self.locate(&shape, bytes) {
                return store::stage_on(&self.alloc, slot, txn_id, value);
            }
        }

        let path = node_path(bytes);
        let handle = self.alloc.strings.intern(bytes)?;
        let segments = path
            .iter()
            .map(|segment| self.alloc.strings.intern(segment))
            .collect::<StrataResult<Vec<StrRef>>>()?;

        let mut shape = self.shape.exclusive();
        let mut nodes = self.nodes.write();
        let root = match shape.root {
            Some(root) => root,
            None => {
                let root = nodes.allocate(TrieNode::new())?;
                shape.root = Some(root);
                root
            }
        };

        let mut current = root;
        for (segment, interned) in path.iter().zip(segments) {
            let position = {
                let strings = self.alloc.strings.read();
                nodes
                    .get(current)
                    .ok_or_else(dangling)?
                    .child_position(segment, &strings)
            };
            current = match position {
                Ok(position) => nodes.get(current).ok_or_else(dangling)?.children[position].1,
                Err(position) => {
                    let child = nodes.allocate(TrieNode::new())?;
                    nodes
                        .get_mut(current)
                        .ok_or_else(dangling)?
                        .children
                        .insert(position, (interned, child));
                    child
                }
            };
        }

        let strings = self.alloc.strings.read();
        let node = nodes.get_mut(current).ok_or_else(dangling)?;
        if let Some(existing) = node.entries.find(bytes, &strings) {
            return store::stage_on(&self.alloc, existing.entry, txn_id, value);
        }

        let mut entry = Entry::new(handle);
        entry.stage(txn_id, value);
        let id = self.alloc.entries.allocate(entry)?;
        let slot = IndexSlot {
            key: handle,
            entry: id,
        };
        shape.entries += 1;
        if node.entries.insert(slot, &strings, self.threshold) {
            shape.bursts += 1;
            info!(key, threshold = self.threshold, "burst trie node");
        }
        Ok(())
    }
}

fn dangling() -> StrataError {
    StrataError::internal("trie references a freed node")
}

/// Ordered traversal collecting one page of a range
struct Scan<'a, 's, 'p, V> {
    nodes: &'a Slab<TrieNode>,
    entries: &'a Slab<Entry<V>>,
    strings: &'a StringsReader<'s>,
    prefix: &'p [u8],
    after: Option<&'p [u8]>,
    view: ReadView,
    limit: usize,
    page: Vec<(String, V)>,
}

impl<'a, 's, 'p, V: Clone> Scan<'a, 's, 'p, V> {
    fn full(&self) -> bool {
        self.page.len() >= self.limit
    }

    /// Visit `node`, whose keys all start with `path`; returns false once
    /// the page is full
    fn visit(&mut self, node: SlotId, path: &mut Vec<u8>, at_root: bool) -> bool {
        let nodes = self.nodes;
        let Some(node) = nodes.get(node) else {
            return true;
        };
        let slots = node.entries.ordered_from(self.strings, self.prefix, self.after);
        let mut slots = slots.iter().peekable();
        let mut children = node.children[self.first_child(node, path, at_root)..]
            .iter()
            .peekable();
        let mut past_prefix = false;

        loop {
            if self.full() {
                return false;
            }
            let next_slot = if past_prefix { None } else { slots.peek() };
            let entry_first = match (next_slot, children.peek()) {
                (Some(slot), Some((segment, _))) => {
                    last_segment(self.strings.bytes(slot.key)) <= self.strings.bytes(*segment)
                }
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => return true,
            };

            if entry_first {
                if let Some(slot) = slots.next() {
                    past_prefix = self.past_prefix(slot);
                    if !past_prefix {
                        self.emit(slot);
                    }
                }
                continue;
            }

            let Some((segment, child)) = children.next() else {
                continue;
            };
            let mark = path.len();
            if !at_root {
                path.push(SEGMENT_SEPARATOR);
            }
            path.extend_from_slice(self.strings.bytes(*segment));
            let descend = path.starts_with(self.prefix) && !self.before_cursor(path);
            let more = !descend || self.visit(*child, path, false);
            path.truncate(mark);
            if !more {
                return false;
            }
        }
    }

    /// Index of the first child of `node` that may hold keys in range
    fn first_child(&self, node: &TrieNode, path: &[u8], at_root: bool) -> usize {
        let mut start = 0;
        if let Some(segment) = segment_floor(self.prefix, path, at_root) {
            start = node.children_from(segment, self.strings);
        }
        if let Some(segment) = self.after.and_then(|after| segment_floor(after, path, at_root)) {
            start = start.max(node.children_from(segment, self.strings));
        }
        start
    }

    /// Whether `slot` and every later entry of its node sort past the
    /// prefix range
    ///
    /// Keys of one node that share a prefix are contiguous.
    fn past_prefix(&self, slot: &IndexSlot) -> bool {
        let key = self.strings.bytes(slot.key);
        !key.starts_with(self.prefix) && compare_qualified(key, self.prefix) == Ordering::Greater
    }

    /// Whether the whole subtree under `path` sorts at or before the cursor
    fn before_cursor(&self, path: &[u8]) -> bool {
        let Some(after) = self.after else {
            return false;
        };
        let nested = after.len() > path.len()
            && after.starts_with(path)
            && after[path.len()] == SEGMENT_SEPARATOR;
        compare_qualified(after, path) == Ordering::Greater && !nested
    }

    fn emit(&mut self, slot: &IndexSlot) {
        let key = self.strings.bytes(slot.key);
        if !key.starts_with(self.prefix) {
            return;
        }
        if let Some(after) = self.after {
            if compare_qualified(key, after) != Ordering::Greater {
                return;
            }
        }
        let value = self
            .entries
            .get(slot.entry)
            .and_then(|entry| entry.visible(&self.view))
            .and_then(|record| record.value.clone());
        if let Some(value) = value {
            self.page.push((self.strings.to_string(slot.key), value));
        }
    }
}

impl<V> VersionedStore<V> for BurstTrie<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str, view: ReadView) -> Option<V> {
        let shape = self.shape.shared();
        let slot = self.locate(&shape, key.as_bytes())?;
        store::visible_value(&self.alloc, slot, &view)
    }

    fn put(&self, key: &str, value: V, txn_id: u64) -> StrataResult<()> {
        self.stage(key, txn_id, Some(value))
    }

    fn remove(&self, key: &str, txn_id: u64) -> StrataResult<()> {
        self.stage(key, txn_id, None)
    }

    fn publish(&self, key: &str, txn_id: u64, commit_version: u64) -> bool {
        let shape = self.shape.shared();
        match self.locate(&shape, key.as_bytes()) {
            Some(slot) => store::publish_on(&self.alloc, slot, txn_id, commit_version),
            None => false,
        }
    }

    fn discard(&self, key: &str, txn_id: u64) -> bool {
        let shape = self.shape.shared();
        match self.locate(&shape, key.as_bytes()) {
            Some(slot) => store::discard_on(&self.alloc, slot, txn_id),
            None => false,
        }
    }

    fn last_modified(&self, key: &str) -> Option<u64> {
        let shape = self.shape.shared();
        let slot = self.locate(&shape, key.as_bytes())?;
        store::last_modified_on(&self.alloc, slot)
    }

    fn scan(
        &self,
        prefix: &str,
        after: Option<&str>,
        view: ReadView,
        limit: usize,
    ) -> Vec<(String, V)> {
        let shape = self.shape.shared();
        let Some(root) = shape.root else {
            return Vec::new();
        };
        let nodes = self.nodes.read();
        let strings = self.alloc.strings.read();
        let entries = self.alloc.entries.read();

        let prefix = prefix.as_bytes();
        let base: &[u8] = match prefix.iter().rposition(|byte| *byte == SEGMENT_SEPARATOR) {
            Some(dot) => &prefix[..dot],
            None => &[],
        };
        let at_root = !prefix.contains(&SEGMENT_SEPARATOR);
        let start = if at_root {
            Some(root)
        } else {
            let path: Vec<&[u8]> = base.split(|byte| *byte == SEGMENT_SEPARATOR).collect();
            descend(&nodes, &strings, root, &path)
        };
        let Some(start) = start else {
            return Vec::new();
        };

        let mut scan = Scan {
            nodes: &nodes,
            entries: &entries,
            strings: &strings,
            prefix,
            after: after.map(str::as_bytes),
            view,
            limit,
            page: Vec::new(),
        };
        let mut path = base.to_vec();
        scan.visit(start, &mut path, at_root);
        scan.page
    }

    fn collect_garbage(&self, horizon: u64) -> GcStats {
        let mut shape = self.shape.exclusive();
        let Some(root) = shape.root else {
            return GcStats::default();
        };
        let mut stats = GcStats::default();
        let mut vacated = Vec::new();
        let mut unlinked = Vec::new();
        {
            let mut nodes = self.nodes.write();
            let mut entries = self.alloc.entries.write();
            let mut pending = vec![root];
            while let Some(id) = pending.pop() {
                let Some(node) = nodes.get_mut(id) else {
                    continue;
                };
                pending.extend(node.children.iter().map(|(_, child)| *child));
                node.entries.retain(|slot| match entries.get_mut(slot.entry) {
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
            unlink_empty(&mut nodes, root, &mut unlinked);
        }
        stats.entries_removed = vacated.len();
        let remaining = shape.entries.saturating_sub(vacated.len());
        shape.entries = remaining;
        for slot in vacated {
            self.alloc.entries.retire(slot, horizon);
        }
        self.alloc.entries.reclaim(horizon);

        let nodes_removed = unlinked.len();
        let bursts_removed = unlinked.iter().filter(|(_, burst)| *burst).count();
        shape.bursts = shape.bursts.saturating_sub(bursts_removed);
        for (node, _) in unlinked {
            self.nodes.retire(node, horizon);
        }
        self.nodes.reclaim(horizon);
        drop(shape);

        if stats.entries_removed > 0 || stats.versions_pruned > 0 || nodes_removed > 0 {
            debug!(
                kind = "burst_trie",
                horizon,
                versions_pruned = stats.versions_pruned,
                entries_removed = stats.entries_removed,
                nodes_removed,
                "garbage collected"
            );
        }
        stats
    }

    fn stats(&self) -> StoreStats {
        let shape = self.shape.shared();
        StoreStats {
            kind: "burst_trie",
            entries: shape.entries,
            nodes: self.nodes.len(),
            bursts: shape.bursts,
            latch: self.shape.stats(),
        }
    }
}

impl<V> BurstTrie<V> {
    /// Whether the node holding keys under `parent` has burst
    ///
    /// `parent` is the key with its last segment removed; pass `""` for the
    /// root.
    pub fn is_burst(&self, parent: &str) -> bool {
        let shape = self.shape.shared();
        let Some(root) = shape.root else {
            return false;
        };
        let nodes = self.nodes.read();
        let strings = self.alloc.strings.read();
        let path: Vec<&[u8]> = if parent.is_empty() {
            Vec::new()
        } else {
            parent.as_bytes().split(|byte| *byte == SEGMENT_SEPARATOR).collect()
        };
        descend(&nodes, &strings, root, &path)
            .and_then(|id| nodes.get(id))
            .map_or(false, |node| node.entries.is_burst())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(threshold: usize) -> BurstTrie<u32> {
        BurstTrie::new(Allocators::default(), threshold)
    }

    fn commit(trie: &BurstTrie<u32>, key: &str, value: u32, version: u64) {
        trie.put(key, value, version).unwrap();
        assert!(trie.publish(key, version, version));
    }

    fn keys(trie: &BurstTrie<u32>, prefix: &str) -> Vec<String> {
        trie.scan(prefix, None, ReadView::committed(u64::MAX), usize::MAX)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    #[test]
    fn test_keys_land_in_parent_node() {
        let t = trie(4);
        commit(&t, "a", 1, 1);
        commit(&t, "a.b", 2, 2);
        commit(&t, "a.b.c", 3, 3);
        let view = ReadView::committed(3);
        assert_eq!(t.get("a", view), Some(1));
        assert_eq!(t.get("a.b", view), Some(2));
        assert_eq!(t.get("a.b.c", view), Some(3));
        assert_eq!(t.get("a.c", view), None);
        assert_eq!(t.len(), 3);
        // root, a, a.b
        assert_eq!(t.stats().nodes, 3);
    }

    #[test]
    fn test_iteration_is_segment_wise() {
        let t = trie(4);
        for (i, key) in ["a-b", "a.c", "a", "a.b.c", "b", "a.b"].iter().enumerate() {
            commit(&t, key, 0, i as u64 + 1);
        }
        assert_eq!(keys(&t, ""), vec!["a", "a.b", "a.b.c", "a.c", "a-b", "b"]);
        assert_eq!(keys(&t, "a"), vec!["a", "a.b", "a.b.c", "a.c", "a-b"]);
        assert_eq!(keys(&t, "a."), vec!["a.b", "a.b.c", "a.c"]);
        assert_eq!(keys(&t, "a.b"), vec!["a.b", "a.b.c"]);
        assert_eq!(keys(&t, "a.b."), vec!["a.b.c"]);
        assert!(keys(&t, "c").is_empty());
        assert!(keys(&t, "x.y.").is_empty());
    }

    #[test]
    fn test_burst_preserves_contents_and_order() {
        let t = trie(3);
        let mut expected = Vec::new();
        for i in (0..10).rev() {
            let key = format!("ns.k{}", i);
            commit(&t, &key, i, 10 - i as u64);
            expected.push(key);
        }
        expected.sort();
        assert!(t.is_burst("ns"));
        assert!(!t.is_burst(""));
        assert_eq!(t.burst_count(), 1);
        assert_eq!(keys(&t, "ns."), expected);
        for i in 0..10 {
            assert_eq!(t.get(&format!("ns.k{}", i), ReadView::committed(10)), Some(i));
        }
    }

    #[test]
    fn test_scan_after_cursor() {
        let t = trie(2);
        for (i, key) in ["ns1.a", "ns1.b", "ns1.b.x", "ns1.c", "ns2.a"].iter().enumerate() {
            commit(&t, key, i as u32, 1 + i as u64);
        }
        let view = ReadView::committed(10);
        let page = t.scan("ns1.", Some("ns1.b"), view, 10);
        let got: Vec<_> = page.into_iter().map(|(k, _)| k).collect();
        assert_eq!(got, vec!["ns1.b.x", "ns1.c"]);

        let page = t.scan("ns1.", Some("ns1.b.x"), view, 1);
        assert_eq!(page, vec![("ns1.c".to_string(), 3)]);
    }

    #[test]
    fn test_pending_writes_visible_to_owner() {
        let t = trie(4);
        t.put("ns.a", 1, 9).unwrap();
        assert_eq!(t.get("ns.a", ReadView::for_txn(9, 0)), Some(1));
        assert_eq!(t.get("ns.a", ReadView::for_txn(8, 0)), None);
        assert_eq!(t.scan("ns.", None, ReadView::for_txn(9, 0), 10).len(), 1);
        assert!(t.discard("ns.a", 9));
        assert_eq!(t.get("ns.a", ReadView::for_txn(9, 0)), None);
    }

    #[test]
    fn test_gc_removes_vacant_entries() {
        let t = trie(2);
        for i in 0..5u32 {
            commit(&t, &format!("ns.k{}", i), i, 1);
        }
        t.remove("ns.k0", 2).unwrap();
        t.publish("ns.k0", 2, 2);
        t.remove("ns.k4", 2).unwrap();
        t.publish("ns.k4", 2, 2);

        let stats = t.collect_garbage(2);
        assert_eq!(stats.entries_removed, 2);
        assert_eq!(t.len(), 3);
        assert!(t.is_burst("ns"));
        assert_eq!(keys(&t, "ns."), vec!["ns.k1", "ns.k2", "ns.k3"]);
    }

    #[test]
    fn test_burst_entries_seek_instead_of_copying() {
        let t = trie(4);
        for i in 0..200u32 {
            commit(&t, &format!("ns.k{:03}", i), i, 1 + i as u64);
        }
        let shape = t.shape.shared();
        let nodes = t.nodes.read();
        let strings = t.alloc.strings.read();
        let root = shape.root.unwrap();
        let node = descend(&nodes, &strings, root, &[&b"ns"[..]]).unwrap();
        let entries = &nodes.get(node).unwrap().entries;

        let tail = entries.ordered_from(&strings, b"ns.", Some(&b"ns.k189"[..]));
        assert!(matches!(tail, Cow::Borrowed(_)));
        assert_eq!(tail.len(), 10);
        assert_eq!(strings.bytes(tail[0].key), b"ns.k190");

        let hundreds = entries.ordered_from(&strings, b"ns.k1", None);
        assert_eq!(hundreds.len(), 100);
        assert_eq!(strings.bytes(hundreds[0].key), b"ns.k100");
    }

    #[test]
    fn test_paged_scan_matches_full_order() {
        let t = trie(4);
        let mut all = Vec::new();
        for i in 0..120u32 {
            all.push(format!("ns.k{:03}", i));
        }
        for extra in ["ns.k050.x", "ns.k050.x.y", "ns.k117.z", "ns1.a", "n.b"] {
            all.push(extra.to_string());
        }
        for (i, key) in all.iter().enumerate() {
            commit(&t, key, i as u32, 1 + i as u64);
        }
        let view = ReadView::committed(u64::MAX);

        for prefix in ["", "ns.", "ns.k0", "ns.k05", "ns.k11", "ns"] {
            let mut expected: Vec<String> = all
                .iter()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            expected.sort_by(|a, b| compare_qualified(a.as_bytes(), b.as_bytes()));

            let mut paged = Vec::new();
            loop {
                let page = t.scan(prefix, paged.last().map(String::as_str), view, 7);
                if page.is_empty() {
                    break;
                }
                paged.extend(page.into_iter().map(|(key, _)| key));
            }
            assert_eq!(paged, expected, "prefix {:?}", prefix);
        }
    }

    #[test]
    fn test_gc_unlinks_emptied_nodes() {
        let t = trie(2);
        let mut version = 0;
        for i in 0..50u32 {
            version += 1;
            commit(&t, &format!("ns{}.x.y", i), i, version);
        }
        version += 1;
        commit(&t, "keep.x.y", 0, version);
        // root, plus two nodes per path
        assert_eq!(t.stats().nodes, 1 + 51 * 2);

        for i in 0..50u32 {
            version += 1;
            let key = format!("ns{}.x.y", i);
            t.remove(&key, version).unwrap();
            assert!(t.publish(&key, version, version));
        }
        let stats = t.collect_garbage(version);
        assert_eq!(stats.entries_removed, 50);
        assert_eq!(t.stats().nodes, 3);
        assert_eq!(t.nodes.stats().reclaimed, 100);
        assert_eq!(t.nodes.stats().retired, 0);
        assert_eq!(keys(&t, ""), vec!["keep.x.y"]);

        // Freed node slots are reused for new paths
        version += 1;
        commit(&t, "ns7.x.y", 7, version);
        assert_eq!(t.get("ns7.x.y", ReadView::committed(version)), Some(7));
        assert_eq!(t.nodes.stats().capacity, 1 + 51 * 2);
    }

    #[test]
    fn test_gc_unlinks_emptied_burst_node() {
        let t = trie(2);
        for i in 0..4u32 {
            commit(&t, &format!("ns.k{}", i), i, 1 + i as u64);
        }
        assert_eq!(t.burst_count(), 1);

        for i in 0..4u32 {
            let key = format!("ns.k{}", i);
            let version = 10 + i as u64;
            t.remove(&key, version).unwrap();
            assert!(t.publish(&key, version, version));
        }
        t.collect_garbage(20);
        assert_eq!(t.burst_count(), 0);
        assert!(!t.is_burst("ns"));
        assert_eq!(t.stats().nodes, 1);
        assert!(t.is_empty());
    }

    #[test]
    fn test_gc_keeps_nodes_with_pending_writes() {
        let t = trie(2);
        commit(&t, "ns.a.b", 1, 1);
        t.remove("ns.a.b", 2).unwrap();
        assert!(t.publish("ns.a.b", 2, 2));
        t.put("ns.a.c", 5, 9).unwrap();

        t.collect_garbage(2);
        assert_eq!(t.stats().nodes, 3);
        assert!(t.publish("ns.a.c", 9, 3));
        assert_eq!(t.get("ns.a.c", ReadView::committed(3)), Some(5));
    }

    #[test]
    fn test_empty_trie() {
        let t = trie(4);
        assert_eq!(t.get("a", ReadView::committed(1)), None);
        assert!(keys(&t, "").is_empty());
        assert_eq!(t.collect_garbage(5), GcStats::default());
        assert!(!t.publish("a", 1, 1));
    }
}
