//! Multi-mutation context
//!
//! Applies an ordered batch of operations, possibly across several managed
//! maps, under one governing transaction. Application stops at the first
//! failing operation and reports it; the caller then rolls the transaction
//! back. Nothing staged here is visible before commit, so a half-applied
//! batch inside an open transaction is harmless as long as it is never
//! committed.

use std::fmt;
use strata_core::StrataResult;
use tracing::debug;

use crate::map::TxnMap;
use crate::transaction::Transaction;

/// One operation of a batch
pub trait Mutation: Send + Sync {
    /// Stage the operation under `txn`
    fn apply(&self, txn: &Transaction) -> StrataResult<()>;

    /// Short description for logs
    fn describe(&self) -> String {
        "mutation".to_string()
    }
}

impl<F> Mutation for F
where
    F: Fn(&Transaction) -> StrataResult<()> + Send + Sync,
{
    fn apply(&self, txn: &Transaction) -> StrataResult<()> {
        self(txn)
    }
}

/// Operation on a single key of a managed map
#[derive(Debug, Clone)]
pub enum MapOp<V> {
    /// Stage a value, replacing any visible one
    Put {
        /// Target key
        key: String,
        /// New value
        value: V,
    },
    /// Stage a value; fails with `AlreadyExists` if one is visible
    Insert {
        /// Target key
        key: String,
        /// New value
        value: V,
    },
    /// Stage a removal; fails with `NotFound` if nothing is visible
    Remove {
        /// Target key
        key: String,
    },
}

impl<V> MapOp<V> {
    /// Key the operation touches
    pub fn key(&self) -> &str {
        match self {
            MapOp::Put { key, .. } | MapOp::Insert { key, .. } | MapOp::Remove { key } => key,
        }
    }
}

/// A [`MapOp`] bound to its map
#[derive(Debug, Clone)]
pub struct MapMutation<V> {
    map: TxnMap<V>,
    op: MapOp<V>,
}

impl<V> MapMutation<V> {
    /// Bind `op` to `map`
    pub fn new(map: TxnMap<V>, op: MapOp<V>) -> Self {
        MapMutation { map, op }
    }
}

impl<V> Mutation for MapMutation<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn apply(&self, txn: &Transaction) -> StrataResult<()> {
        match &self.op {
            MapOp::Put { key, value } => self.map.put(txn, key, value.clone()),
            MapOp::Insert { key, value } => self.map.insert(txn, key, value.clone()),
            MapOp::Remove { key } => self.map.remove(txn, key).map(|_| ()),
        }
    }

    fn describe(&self) -> String {
        let verb = match self.op {
            MapOp::Put { .. } => "put",
            MapOp::Insert { .. } => "insert",
            MapOp::Remove { .. } => "remove",
        };
        format!("{} {}:{}", verb, self.map.name(), self.op.key())
    }
}

/// Ordered batch of mutations under one transaction
pub struct MultiMutationContext<'t> {
    txn: &'t Transaction,
    mutations: Vec<Box<dyn Mutation>>,
    failed_at: Option<usize>,
}

impl<'t> MultiMutationContext<'t> {
    /// Empty batch governed by `txn`
    pub fn new(txn: &'t Transaction) -> Self {
        MultiMutationContext {
            txn,
            mutations: Vec::new(),
            failed_at: None,
        }
    }

    /// Governing transaction
    pub fn transaction(&self) -> &'t Transaction {
        self.txn
    }

    /// Queue a put of `value` under `key`
    pub fn put<V>(&mut self, map: &TxnMap<V>, key: impl Into<String>, value: V) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.push(MapMutation::new(
            map.clone(),
            MapOp::Put {
                key: key.into(),
                value,
            },
        ))
    }

    /// Queue a put-if-absent
    pub fn insert<V>(&mut self, map: &TxnMap<V>, key: impl Into<String>, value: V) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.push(MapMutation::new(
            map.clone(),
            MapOp::Insert {
                key: key.into(),
                value,
            },
        ))
    }

    /// Queue a removal
    pub fn remove<V>(&mut self, map: &TxnMap<V>, key: impl Into<String>) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.push(MapMutation::new(map.clone(), MapOp::Remove { key: key.into() }))
    }

    /// Queue any mutation
    pub fn push(&mut self, mutation: impl Mutation + 'static) -> &mut Self {
        self.mutations.push(Box::new(mutation));
        self
    }

    /// Number of queued mutations
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Index of the mutation that failed during the last `apply`
    pub fn failed_at(&self) -> Option<usize> {
        self.failed_at
    }

    /// Apply every queued mutation in order
    ///
    /// Stops at the first error and returns it unchanged; later mutations
    /// are not attempted. Returns the number applied on success.
    pub fn apply(&mut self) -> StrataResult<usize> {
        self.failed_at = None;
        for (index, mutation) in self.mutations.iter().enumerate() {
            if let Err(err) = mutation.apply(self.txn) {
                self.failed_at = Some(index);
                debug!(
                    txn_id = self.txn.id(),
                    index,
                    mutation = %mutation.describe(),
                    error = %err,
                    "multi-mutation stopped"
                );
                return Err(err);
            }
        }
        Ok(self.mutations.len())
    }
}

impl fmt::Debug for MultiMutationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let described: Vec<String> = self.mutations.iter().map(|m| m.describe()).collect();
        f.debug_struct("MultiMutationContext")
            .field("txn_id", &self.txn.id())
            .field("mutations", &described)
            .field("failed_at", &self.failed_at)
            .finish()
    }
}
