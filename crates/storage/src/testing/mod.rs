//! Testing utilities for the ordered structures
//!
//! - **Reference Model**: std-collection model of a versioned map, used to
//!   check structures against expected contents at any snapshot

mod reference_model;

pub use reference_model::{ReferenceModel, StateMismatch};
