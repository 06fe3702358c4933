//! Core types and traits for the Strata catalog engine
//!
//! This crate defines the foundational types used throughout the system:
//! - StrataError: Error kinds surfaced by every layer
//! - QualifiedName: Hierarchical, dot-separated entity names
//! - KeyComparator: Raw and qualified-name key orders, ByReferent
//! - ReadView: Snapshot visibility passed to versioned structures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod name;
pub mod ordering;
pub mod types;

pub use error::{StrataError, StrataResult};
pub use name::{QualifiedName, MAX_QUALIFIED_NAME_LENGTH};
pub use ordering::{
    compare_qualified, compare_raw, ByReferent, KeyComparator, KeyOrder, QualifiedNameOrder,
    RawKeyOrder, SEGMENT_SEPARATOR,
};
pub use types::ReadView;
