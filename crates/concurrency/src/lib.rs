//! Concurrency layer for the Strata catalog engine
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionManager: global commit counter, active snapshots, GC horizon
//! - Transaction: write set, read dependencies, commit/rollback
//! - TxnMap: versioned structure bound to the transaction subsystem
//! - MultiMutationContext: ordered batches across maps, first error wins
//!
//! Isolation is snapshot isolation with first-committer-wins on written
//! keys. Plain reads are not validated; read dependencies opted into with
//! `TxnMap::get_tracked` are.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod map;
pub mod multi;
pub mod target;
pub mod transaction;
pub mod validation;

pub use manager::{GcReport, SnapshotPin, TransactionManager, TransactionMetrics};
pub use map::TxnMap;
pub use multi::{MapMutation, MapOp, MultiMutationContext, Mutation};
pub use target::WriteTarget;
pub use transaction::{PendingOperations, Transaction, TransactionStatus, WriteKind};
pub use validation::{ConflictType, ValidationResult};
