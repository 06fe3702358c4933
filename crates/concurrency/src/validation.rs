//! Commit-time validation
//!
//! Conflict rules:
//! - First-committer-wins on the WRITE set: a key this transaction wrote
//!   that another transaction committed after our snapshot aborts us
//! - Read dependencies are checked the same way; plain reads are not
//!   tracked, so write skew between unrelated keys is allowed
//!
//! Validation runs under the manager's commit lock, so nothing can commit
//! between the check and the publish that follows it.

use strata_core::StrataError;

use crate::target::WriteTarget;

/// Conflict found while validating a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A key in the write set was committed by someone else after our
    /// snapshot
    WriteWrite {
        /// Map holding the key
        target: String,
        /// Conflicting key
        key: String,
        /// Snapshot of the validating transaction
        snapshot: u64,
        /// Commit version of the competing change
        modified_at: u64,
    },

    /// A key recorded as a read dependency changed after our snapshot
    ReadWrite {
        /// Map holding the key
        target: String,
        /// Conflicting key
        key: String,
        /// Snapshot of the validating transaction
        snapshot: u64,
        /// Commit version of the competing change
        modified_at: u64,
    },
}

impl ConflictType {
    /// Conflicting key
    pub fn key(&self) -> &str {
        match self {
            ConflictType::WriteWrite { key, .. } | ConflictType::ReadWrite { key, .. } => key,
        }
    }

    /// Error reported to the caller for this conflict
    pub fn to_error(&self) -> StrataError {
        match self {
            ConflictType::WriteWrite {
                key,
                snapshot,
                modified_at,
                ..
            }
            | ConflictType::ReadWrite {
                key,
                snapshot,
                modified_at,
                ..
            } => StrataError::conflict(key.clone(), *snapshot, *modified_at),
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found. A transaction commits only if
/// `is_valid()` returns true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// First conflict as an error, `Ok` when valid
    pub fn into_result(self) -> Result<(), StrataError> {
        match self.conflicts.first() {
            Some(conflict) => Err(conflict.to_error()),
            None => Ok(()),
        }
    }
}

/// Commit version of a change to `key` made after `snapshot`, if any
#[inline]
pub fn modified_after(target: &dyn WriteTarget, key: &str, snapshot: u64) -> Option<u64> {
    target
        .last_modified(key)
        .filter(|modified_at| *modified_at > snapshot)
}

/// Check every written key against commits after `snapshot`
pub fn validate_write_set<'a, I>(snapshot: u64, writes: I) -> ValidationResult
where
    I: IntoIterator<Item = (&'a dyn WriteTarget, &'a str)>,
{
    let mut result = ValidationResult::ok();
    for (target, key) in writes {
        if let Some(modified_at) = modified_after(target, key, snapshot) {
            result.conflicts.push(ConflictType::WriteWrite {
                target: target.name().to_string(),
                key: key.to_string(),
                snapshot,
                modified_at,
            });
        }
    }
    result
}

/// Check every read dependency against commits after `snapshot`
pub fn validate_read_set<'a, I>(snapshot: u64, reads: I) -> ValidationResult
where
    I: IntoIterator<Item = (&'a dyn WriteTarget, &'a str)>,
{
    let mut result = ValidationResult::ok();
    for (target, key) in reads {
        if let Some(modified_at) = modified_after(target, key, snapshot) {
            result.conflicts.push(ConflictType::ReadWrite {
                target: target.name().to_string(),
                key: key.to_string(),
                snapshot,
                modified_at,
            });
        }
    }
    result
}
