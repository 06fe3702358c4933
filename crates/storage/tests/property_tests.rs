//! Property-based tests for the ordered structures.
//!
//! Every structure is driven with the same committed history as a
//! `ReferenceModel` and must answer every get and range identically at
//! every snapshot, whatever its burst threshold.

use proptest::prelude::*;

use strata_core::{KeyOrder, ReadView};
use strata_storage::testing::ReferenceModel;
use strata_storage::{Allocators, BurstTrie, Range, TxnFlatMap, VersionedStore};

#[derive(Debug, Clone)]
enum Op {
    Put(String, u32),
    Remove(String),
}

fn arb_key() -> impl Strategy<Value = String> {
    "[ab]{1,2}(\\.[ab-]{1,2}){0,2}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (arb_key(), any::<u32>()).prop_map(|(key, value)| Op::Put(key, value)),
        1 => arb_key().prop_map(Op::Remove),
    ]
}

fn arb_prefix() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["", "a", "a.", "a.b", "b.", "ab.a", "a-", "b.a."])
        .prop_map(String::from)
}

/// Apply each op as its own commit, version = position + 1
fn replay(store: &dyn VersionedStore<u32>, model: &mut ReferenceModel<u32>, ops: &[Op]) {
    for (i, op) in ops.iter().enumerate() {
        let version = i as u64 + 1;
        match op {
            Op::Put(key, value) => {
                store.put(key, *value, version).unwrap();
                assert!(store.publish(key, version, version));
                model.put(key, *value, version);
            }
            Op::Remove(key) => {
                store.remove(key, version).unwrap();
                assert!(store.publish(key, version, version));
                model.remove(key, version);
            }
        }
    }
}

fn check(
    store: &dyn VersionedStore<u32>,
    model: &ReferenceModel<u32>,
    prefixes: &[String],
    from_snapshot: u64,
) -> Result<(), TestCaseError> {
    for snapshot in from_snapshot..=model.last_version() {
        let view = ReadView::committed(snapshot);
        for key in model.keys() {
            prop_assert_eq!(store.get(key, view), model.get(key, snapshot).copied());
        }
        for prefix in prefixes {
            let actual: Vec<(String, u32)> = Range::new(store, prefix, view)
                .with_page_size(3)
                .collect();
            let mismatches = model.compare_range(prefix, snapshot, &actual);
            prop_assert!(mismatches.is_empty(), "{:?}", mismatches);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_burst_trie_matches_model(
        ops in prop::collection::vec(arb_op(), 1..60),
        threshold in 1usize..6,
        prefixes in prop::collection::vec(arb_prefix(), 1..4),
    ) {
        let trie = BurstTrie::new(Allocators::default(), threshold);
        let mut model = ReferenceModel::new(KeyOrder::Qualified);
        replay(&trie, &mut model, &ops);
        check(&trie, &model, &prefixes, 0)?;
    }

    #[test]
    fn prop_flat_map_matches_model(
        ops in prop::collection::vec(arb_op(), 1..60),
        raw in any::<bool>(),
        prefixes in prop::collection::vec(arb_prefix(), 1..4),
    ) {
        let order = if raw { KeyOrder::Raw } else { KeyOrder::Qualified };
        let map = TxnFlatMap::new(Allocators::default(), order.comparator());
        let mut model = ReferenceModel::new(order);
        replay(&map, &mut model, &ops);
        check(&map, &model, &prefixes, 0)?;
    }

    #[test]
    fn prop_burst_is_invisible_to_readers(
        ops in prop::collection::vec(arb_op(), 1..60),
        prefixes in prop::collection::vec(arb_prefix(), 1..4),
    ) {
        // A trie that bursts almost immediately and one that never does
        let eager = BurstTrie::new(Allocators::default(), 1);
        let lazy = BurstTrie::new(Allocators::default(), usize::MAX);
        let mut model = ReferenceModel::new(KeyOrder::Qualified);
        replay(&eager, &mut model, &ops);
        replay(&lazy, &mut ReferenceModel::new(KeyOrder::Qualified), &ops);
        prop_assert_eq!(lazy.burst_count(), 0);

        let view = ReadView::committed(model.last_version());
        for prefix in &prefixes {
            let a: Vec<_> = eager.range(prefix, view).collect();
            let b: Vec<_> = lazy.range(prefix, view).collect();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn prop_gc_preserves_snapshots_at_or_after_horizon(
        ops in prop::collection::vec(arb_op(), 1..60),
        horizon_pick in any::<prop::sample::Index>(),
        prefixes in prop::collection::vec(arb_prefix(), 1..4),
    ) {
        let trie = BurstTrie::new(Allocators::default(), 2);
        let map = TxnFlatMap::new(Allocators::default(), KeyOrder::Qualified.comparator());
        let mut model = ReferenceModel::new(KeyOrder::Qualified);
        replay(&trie, &mut model, &ops);
        replay(&map, &mut ReferenceModel::new(KeyOrder::Qualified), &ops);

        let horizon = horizon_pick.index(ops.len()) as u64 + 1;
        trie.collect_garbage(horizon);
        map.collect_garbage(horizon);

        check(&trie, &model, &prefixes, horizon)?;
        check(&map, &model, &prefixes, horizon)?;
    }
}
