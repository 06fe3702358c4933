//! Version chains
//!
//! Every index slot points at an [`Entry`]: the key handle plus its version
//! records. A record is either pending (staged by one transaction, seen only
//! by that transaction) or committed at a version, and a committed record is
//! later retired by the commit that supersedes it.
//!
//! # Invariants
//!
//! - At most one committed record per entry has no retirement version
//!   (the current one)
//! - At most one pending record per writer
//! - Removals are staged as pending records without a value (tombstones);
//!   publishing one retires the current record and leaves nothing behind

use smallvec::SmallVec;
use strata_core::ReadView;

use crate::arena::StrRef;

/// One version of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord<V> {
    /// Transaction that staged this version
    pub writer: u64,
    /// Commit version, `None` while pending
    pub committed_at: Option<u64>,
    /// Version of the commit that superseded this one
    pub retired_at: Option<u64>,
    /// Payload, `None` for a tombstone
    pub value: Option<V>,
}

impl<V> VersionRecord<V> {
    /// Whether the record is still pending
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.committed_at.is_none()
    }

    /// Whether the record stages a removal
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Version-aware lookup shared by entries
pub trait TxnAware {
    /// Payload type
    type Value;

    /// Record visible to `view`, tombstones included
    fn visible(&self, view: &ReadView) -> Option<&VersionRecord<Self::Value>>;

    /// Commit version of the latest committed change, if any
    fn last_modified(&self) -> Option<u64>;
}

/// Index entry: key handle plus version chain, oldest first
#[derive(Debug)]
pub struct Entry<V> {
    key: StrRef,
    versions: SmallVec<[VersionRecord<V>; 2]>,
    current: Option<usize>,
}

impl<V> Entry<V> {
    /// Entry without any version
    pub fn new(key: StrRef) -> Self {
        Entry {
            key,
            versions: SmallVec::new(),
            current: None,
        }
    }

    /// Key handle
    #[inline]
    pub fn key(&self) -> StrRef {
        self.key
    }

    /// Stage a pending version for `writer`, replacing its previous one
    pub fn stage(&mut self, writer: u64, value: Option<V>) {
        if let Some(record) = self
            .versions
            .iter_mut()
            .find(|record| record.is_pending() && record.writer == writer)
        {
            record.value = value;
            return;
        }
        self.versions.push(VersionRecord {
            writer,
            committed_at: None,
            retired_at: None,
            value,
        });
    }

    /// Commit `writer`'s pending version at `commit_version`
    ///
    /// The previously current record is retired at the same version. A
    /// published tombstone leaves the key without a current record.
    /// Returns false when `writer` has nothing pending here.
    pub fn publish(&mut self, writer: u64, commit_version: u64) -> bool {
        let Some(position) = self
            .versions
            .iter()
            .position(|record| record.is_pending() && record.writer == writer)
        else {
            return false;
        };

        if let Some(current) = self.current {
            self.versions[current].retired_at = Some(commit_version);
        }
        if self.versions[position].is_tombstone() {
            self.versions.remove(position);
        } else {
            self.versions[position].committed_at = Some(commit_version);
        }
        self.refresh_current();
        true
    }

    /// Drop `writer`'s pending version
    pub fn discard(&mut self, writer: u64) -> bool {
        let before = self.versions.len();
        self.versions
            .retain(|record| !(record.is_pending() && record.writer == writer));
        let removed = self.versions.len() != before;
        if removed {
            self.refresh_current();
        }
        removed
    }

    /// Drop committed records retired at or before `horizon`
    ///
    /// Returns the number of records removed.
    pub fn prune(&mut self, horizon: u64) -> usize {
        let before = self.versions.len();
        self.versions.retain(|record| match record.retired_at {
            Some(retired) => retired > horizon,
            None => true,
        });
        let removed = before - self.versions.len();
        if removed > 0 {
            self.refresh_current();
        }
        removed
    }

    /// Whether the entry holds no version at all
    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.versions.is_empty()
    }

    /// Whether any transaction has a pending version here
    pub fn has_pending(&self) -> bool {
        self.versions.iter().any(VersionRecord::is_pending)
    }

    /// The committed record nobody has superseded yet
    pub fn current(&self) -> Option<&VersionRecord<V>> {
        self.current.and_then(|index| self.versions.get(index))
    }

    /// Number of records in the chain
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    fn refresh_current(&mut self) {
        self.current = self
            .versions
            .iter()
            .position(|record| record.committed_at.is_some() && record.retired_at.is_none());
    }
}

impl<V> TxnAware for Entry<V> {
    type Value = V;

    fn visible(&self, view: &ReadView) -> Option<&VersionRecord<V>> {
        if view.txn_id.is_some() {
            if let Some(own) = self
                .versions
                .iter()
                .find(|record| record.is_pending() && view.owns(record.writer))
            {
                return Some(own);
            }
        }
        self.versions
            .iter()
            .rev()
            .find(|record| match record.committed_at {
                Some(committed) => view.sees(committed, record.retired_at),
                None => false,
            })
    }

    fn last_modified(&self) -> Option<u64> {
        self.versions
            .iter()
            .filter_map(|record| {
                let committed = record.committed_at?;
                Some(record.retired_at.map_or(committed, |r| r.max(committed)))
            })
            .max()
    }
}
