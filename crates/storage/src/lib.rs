//! Storage layer for the Strata catalog engine
//!
//! This crate implements the ordered, multi-versioned structures that back
//! every repository:
//! - StringArena / ObjectArena: key bytes and entry slots
//! - SharedLatch: shared/exclusive latch guarding a structure's shape
//! - Entry: per-key version chain with pending and committed records
//! - TxnFlatMap: sorted-vector map searched by binary search
//! - BurstTrie: trie over qualified-name segments with bursting nodes
//! - VersionedStore: object-safe seam used by the transaction layer
//! - Range: lazy, cursor-based prefix iteration
//!
//! # Lock order
//!
//! Structure latch, then node arena, then string arena, then entry arena.
//! Strings are interned before any of these is taken.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod burst_trie;
pub mod flat_map;
pub mod latch;
pub mod range;
pub mod store;
pub mod testing;
pub mod version;

pub use arena::{
    Allocators, ArenaLimits, ObjectArena, ObjectArenaStats, SlotId, StrRef, StringArena,
    StringArenaStats,
};
pub use burst_trie::{BurstTrie, DEFAULT_BURST_THRESHOLD};
pub use flat_map::{FlatIndex, IndexSlot, TxnFlatMap};
pub use latch::{LatchStats, SharedLatch};
pub use range::{Range, DEFAULT_RANGE_PAGE_SIZE};
pub use store::{GcStats, StoreStats, VersionedStore};
pub use version::{Entry, TxnAware, VersionRecord};
