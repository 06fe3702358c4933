//! Error types for the catalog engine
//!
//! This module defines the single error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every kind is returned as a typed result. The structures and the
//! transaction-managed map surface errors unchanged; the repository layer
//! translates map-level `NotFound` into entity-level errors and passes
//! `Conflict` / `InvalidState` through untouched.

use thiserror::Error;

/// Result type alias for catalog operations
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Error kinds for the catalog engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrataError {
    /// No visible entity for a key at the given snapshot
    #[error("{entity} not found: {name}")]
    NotFound {
        /// Kind of the missing thing ("key", "dataset", ...)
        entity: &'static str,
        /// Name or key that was looked up
        name: String,
    },

    /// A create collided with a visible entity
    #[error("{entity} already exists: {name}")]
    AlreadyExists {
        /// Kind of the colliding entity
        entity: &'static str,
        /// Name that is already taken
        name: String,
    },

    /// Write-write race detected; retry with a fresh transaction
    #[error("conflict on {key}: modified at version {modified_at}, after snapshot {snapshot}")]
    Conflict {
        /// Key that was modified concurrently
        key: String,
        /// Snapshot of the losing transaction
        snapshot: u64,
        /// Commit version of the winning modification
        modified_at: u64,
    },

    /// Operation on a transaction that is no longer Active
    #[error("transaction {txn_id} is not active: {state}")]
    InvalidState {
        /// Transaction identifier
        txn_id: u64,
        /// Current state, human readable
        state: String,
    },

    /// A cross-entity reference could not be resolved
    #[error("referenced {entity} not found: {name}")]
    ReferenceNotFound {
        /// Kind of the referenced entity
        entity: &'static str,
        /// Name of the referenced entity
        name: String,
    },

    /// An arena refused an allocation because its limit is reached
    #[error("{arena} arena exhausted: requested {requested}, limit {limit}")]
    ArenaExhausted {
        /// Which arena ("string", "object")
        arena: &'static str,
        /// Size of the refused request (bytes or slots)
        requested: usize,
        /// Configured limit
        limit: usize,
    },

    /// Malformed input (bad name, bad argument)
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem
        message: String,
    },

    /// Invalid or unreadable configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// An engine invariant was violated
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl StrataError {
    /// Create a `NotFound` error
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        StrataError::NotFound {
            entity,
            name: name.into(),
        }
    }

    /// Create an `AlreadyExists` error
    pub fn already_exists(entity: &'static str, name: impl Into<String>) -> Self {
        StrataError::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

    /// Create a `Conflict` error
    pub fn conflict(key: impl Into<String>, snapshot: u64, modified_at: u64) -> Self {
        StrataError::Conflict {
            key: key.into(),
            snapshot,
            modified_at,
        }
    }

    /// Create an `InvalidState` error
    pub fn invalid_state(txn_id: u64, state: impl Into<String>) -> Self {
        StrataError::InvalidState {
            txn_id,
            state: state.into(),
        }
    }

    /// Create a `ReferenceNotFound` error
    pub fn reference_not_found(entity: &'static str, name: impl Into<String>) -> Self {
        StrataError::ReferenceNotFound {
            entity,
            name: name.into(),
        }
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StrataError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a `Config` error
    pub fn config(message: impl Into<String>) -> Self {
        StrataError::Config {
            message: message.into(),
        }
    }

    /// Create an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        StrataError::Internal {
            message: message.into(),
        }
    }

    /// Stable code for the error kind, used by the service layer to pick a
    /// wire status
    pub fn error_code(&self) -> &'static str {
        match self {
            StrataError::NotFound { .. } => "NotFound",
            StrataError::AlreadyExists { .. } => "AlreadyExists",
            StrataError::Conflict { .. } => "Conflict",
            StrataError::InvalidState { .. } => "InvalidState",
            StrataError::ReferenceNotFound { .. } => "ReferenceNotFound",
            StrataError::ArenaExhausted { .. } => "ArenaExhausted",
            StrataError::InvalidInput { .. } => "InvalidInput",
            StrataError::Config { .. } => "Config",
            StrataError::Internal { .. } => "Internal",
        }
    }

    /// Whether reissuing the operation in a fresh transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StrataError::Conflict { .. })
    }

    /// Check for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::NotFound { .. })
    }

    /// Check for `Conflict`
    pub fn is_conflict(&self) -> bool {
        matches!(self, StrataError::Conflict { .. })
    }
}
