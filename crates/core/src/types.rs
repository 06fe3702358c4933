//! Core value types shared by the storage and concurrency layers

/// Visibility argument for versioned reads
///
/// A view sees every version committed at or before `snapshot` that has not
/// been retired at or before `snapshot`. When `txn_id` is set, the owning
/// transaction's own pending versions take precedence (read-your-writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadView {
    /// Highest commit version visible to this view
    pub snapshot: u64,
    /// Transaction whose pending writes are visible, if any
    pub txn_id: Option<u64>,
}

impl ReadView {
    /// View of committed data only
    pub fn committed(snapshot: u64) -> Self {
        ReadView {
            snapshot,
            txn_id: None,
        }
    }

    /// View of a transaction: its snapshot plus its own pending writes
    pub fn for_txn(txn_id: u64, snapshot: u64) -> Self {
        ReadView {
            snapshot,
            txn_id: Some(txn_id),
        }
    }

    /// Whether a version committed at `committed_at` and retired at
    /// `retired_at` is visible to this view
    #[inline]
    pub fn sees(&self, committed_at: u64, retired_at: Option<u64>) -> bool {
        committed_at <= self.snapshot && retired_at.map_or(true, |r| r > self.snapshot)
    }

    /// Whether pending writes of `writer` belong to this view
    #[inline]
    pub fn owns(&self, writer: u64) -> bool {
        self.txn_id == Some(writer)
    }
}
