//! Reference model for versioned ordered maps
//!
//! Tracks every committed version of every key in plain std collections so
//! tests can compare a structure's answers at any snapshot against the
//! expected ones.
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::testing::ReferenceModel;
//!
//! let mut model = ReferenceModel::new(KeyOrder::Qualified);
//! model.put("ns1.a", 1, 1);
//! model.remove("ns1.a", 2);
//!
//! let mismatches = model.compare_range("ns1.", 1, &actual_pairs);
//! assert!(mismatches.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt::Debug;
use strata_core::KeyOrder;

/// Expected committed history of a map
#[derive(Debug, Clone)]
pub struct ReferenceModel<V> {
    /// key -> (commit version, value or tombstone), ascending by version
    history: BTreeMap<String, Vec<(u64, Option<V>)>>,
    order: KeyOrder,
    last_version: u64,
}

impl<V: Clone + PartialEq + Debug> ReferenceModel<V> {
    /// Empty model iterating in `order`
    pub fn new(order: KeyOrder) -> Self {
        ReferenceModel {
            history: BTreeMap::new(),
            order,
            last_version: 0,
        }
    }

    /// Record a committed write
    pub fn put(&mut self, key: &str, value: V, version: u64) {
        self.record(key, Some(value), version);
    }

    /// Record a committed removal
    pub fn remove(&mut self, key: &str, version: u64) {
        self.record(key, None, version);
    }

    fn record(&mut self, key: &str, value: Option<V>, version: u64) {
        self.last_version = self.last_version.max(version);
        self.history
            .entry(key.to_string())
            .or_default()
            .push((version, value));
    }

    /// Highest version recorded
    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    /// Value of `key` at `snapshot`
    pub fn get(&self, key: &str, snapshot: u64) -> Option<&V> {
        self.history
            .get(key)?
            .iter()
            .rev()
            .find(|(version, _)| *version <= snapshot)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Visible pairs under `prefix` at `snapshot`, in the model's order
    pub fn range(&self, prefix: &str, snapshot: u64) -> Vec<(String, V)> {
        let mut pairs: Vec<(String, V)> = self
            .history
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter_map(|key| {
                self.get(key, snapshot)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();
        let comparator = self.order.comparator();
        pairs.sort_by(|a, b| comparator.compare(a.0.as_bytes(), b.0.as_bytes()));
        pairs
    }

    /// Every key ever written
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.history.keys()
    }

    /// Compare the expected range against `actual`
    ///
    /// Returns the list of mismatches found, in order.
    pub fn compare_range(
        &self,
        prefix: &str,
        snapshot: u64,
        actual: &[(String, V)],
    ) -> Vec<StateMismatch> {
        let expected = self.range(prefix, snapshot);
        let mut mismatches = Vec::new();

        if expected.len() != actual.len() {
            mismatches.push(StateMismatch {
                entity: format!("range:{}@{}:count", prefix, snapshot),
                expected: expected.len().to_string(),
                actual: actual.len().to_string(),
            });
        }
        for (i, (exp, act)) in expected.iter().zip(actual.iter()).enumerate() {
            if exp != act {
                mismatches.push(StateMismatch {
                    entity: format!("range:{}@{}:{}", prefix, snapshot, i),
                    expected: format!("{:?}", exp),
                    actual: format!("{:?}", act),
                });
            }
        }
        mismatches
    }

    /// Drop all history
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_version = 0;
    }
}

/// Difference between expected and actual state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMismatch {
    /// What was compared
    pub entity: String,
    /// Expected value
    pub expected: String,
    /// Actual value
    pub actual: String,
}

impl std::fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.entity, self.expected, self.actual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_is_empty() {
        let model: ReferenceModel<u32> = ReferenceModel::new(KeyOrder::Raw);
        assert_eq!(model.keys().count(), 0);
        assert_eq!(model.last_version(), 0);
    }

    #[test]
    fn test_versions() {
        let mut model = ReferenceModel::new(KeyOrder::Raw);
        model.put("k", 1u32, 1);
        model.put("k", 2, 3);
        model.remove("k", 5);
        assert_eq!(model.get("k", 0), None);
        assert_eq!(model.get("k", 2), Some(&1));
        assert_eq!(model.get("k", 4), Some(&2));
        assert_eq!(model.get("k", 5), None);
    }

    #[test]
    fn test_range_order() {
        let mut model = ReferenceModel::new(KeyOrder::Qualified);
        model.put("a-b", 1u32, 1);
        model.put("a.c", 2, 1);
        model.put("a", 3, 1);
        let keys: Vec<String> = model.range("a", 1).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "a.c", "a-b"]);
    }

    #[test]
    fn test_compare_range_reports_mismatch() {
        let mut model = ReferenceModel::new(KeyOrder::Raw);
        model.put("x.a", 1u32, 1);
        assert!(model
            .compare_range("x.", 1, &[("x.a".to_string(), 1)])
            .is_empty());
        let mismatches = model.compare_range("x.", 1, &[("x.a".to_string(), 2)]);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].to_string().contains("range:x.@1:0"));
    }

    #[test]
    fn test_reset() {
        let mut model = ReferenceModel::new(KeyOrder::Raw);
        model.put("k", 1u32, 1);
        model.reset();
        assert_eq!(model.get("k", 1), None);
    }
}
