//! Ordering utilities for keys
//!
//! Comparators for raw keys and for qualified (dot-separated) names, plus a
//! wrapper that orders smart pointers by what they point to.
//!
//! # Prefix contiguity
//!
//! Every comparator here guarantees that all keys sharing a byte prefix `p`
//! sort contiguously and never before `p` itself. Range scans rely on this:
//! they seek to `p` and stop at the first key that no longer starts with it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Separator between qualified name segments
pub const SEGMENT_SEPARATOR: u8 = b'.';

/// Total order over raw key bytes
///
/// Implementations must be pure and stateless, and must satisfy the prefix
/// contiguity property described in the module docs.
pub trait KeyComparator: Send + Sync + fmt::Debug {
    /// Compare two keys
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Short name used in logs and stats
    fn name(&self) -> &'static str;
}

/// Plain lexicographic byte order
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeyOrder;

impl KeyComparator for RawKeyOrder {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_raw(a, b)
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

/// Segment-wise order for qualified names
///
/// Names are compared segment by segment; a name sorts directly before the
/// names nested under it (`a` < `a.b` < `a.b.c` < `a.c` < `a-b`).
#[derive(Debug, Clone, Copy, Default)]
pub struct QualifiedNameOrder;

impl KeyComparator for QualifiedNameOrder {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_qualified(a, b)
    }

    fn name(&self) -> &'static str {
        "qualified"
    }
}

static RAW_ORDER: RawKeyOrder = RawKeyOrder;
static QUALIFIED_ORDER: QualifiedNameOrder = QualifiedNameOrder;

/// Byte-wise comparison
#[inline]
pub fn compare_raw(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Segment-wise comparison of dot-separated names
pub fn compare_qualified(a: &[u8], b: &[u8]) -> Ordering {
    let mut left = a.split(|byte| *byte == SEGMENT_SEPARATOR);
    let mut right = b.split(|byte| *byte == SEGMENT_SEPARATOR);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match l.cmp(r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Selects one of the built-in comparators
///
/// This is a construction-time choice for a repository; it cannot change
/// once the repository holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    /// [`RawKeyOrder`]
    Raw,
    /// [`QualifiedNameOrder`]
    #[default]
    Qualified,
}

impl KeyOrder {
    /// The comparator for this order
    pub fn comparator(self) -> &'static dyn KeyComparator {
        match self {
            KeyOrder::Raw => &RAW_ORDER,
            KeyOrder::Qualified => &QUALIFIED_ORDER,
        }
    }
}

/// Orders, compares and hashes a pointer by its referent
///
/// Two `ByReferent<Arc<str>>` built from separate allocations of the same
/// text are equal, which keeps map keys independent of where a string
/// happens to live.
#[derive(Debug, Clone)]
pub struct ByReferent<P>(pub P);

impl<P> ByReferent<P> {
    /// Unwrap the pointer
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P: Deref> Deref for ByReferent<P> {
    type Target = P::Target;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P> PartialEq for ByReferent<P>
where
    P: Deref,
    P::Target: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<P> Eq for ByReferent<P>
where
    P: Deref,
    P::Target: Eq,
{
}

impl<P> PartialOrd for ByReferent<P>
where
    P: Deref,
    P::Target: Ord,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for ByReferent<P>
where
    P: Deref,
    P::Target: Ord,
{
    fn cmp(&self, other: &Self) -> Ordering {
        (*self.0).cmp(&*other.0)
    }
}

impl<P> Hash for ByReferent<P>
where
    P: Deref,
    P::Target: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).hash(state)
    }
}
