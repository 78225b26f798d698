//! Error types for the adapter tree.

use syncroot_core::domain::{AltId, SyncId};
use thiserror::Error;
use tracing::error;

/// Errors returned by adapter tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The mutation would break a tree invariant
    #[error("tree consistency violation: {0}")]
    ConsistencyViolation(#[from] ConsistencyViolation),

    #[error("node {0} not found")]
    NotFound(SyncId),
}

/// Invariant breaches. These indicate a defect upstream (bad enumeration
/// order, stale caller state) and are never silently tolerated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyViolation {
    #[error("parent {parent} of node {node} does not exist")]
    DanglingParent { node: SyncId, parent: SyncId },

    #[error("moving node {node} under {parent} would create a cycle")]
    Cycle { node: SyncId, parent: SyncId },

    #[error("sync id {0} belonged to a deleted node and cannot be reused")]
    IdentityReused(SyncId),

    #[error("parent {parent} of node {node} is not a directory")]
    ParentNotDirectory { node: SyncId, parent: SyncId },

    #[error("invalid root mutation: {0}")]
    RootMutation(String),

    #[error("parent alt id {0} is not in the tree")]
    UnresolvedParent(AltId),

    #[error("alt id {0} reported for more than one entry in a single enumeration")]
    DuplicateAltId(AltId),

    #[error("tree lock poisoned")]
    LockPoisoned,
}

impl TreeError {
    /// Returns true for invariant breaches, false for plain lookups misses.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, TreeError::ConsistencyViolation(_))
    }
}

/// Logs an invariant breach and wraps it into a [`TreeError`].
pub(crate) fn violation(violation: ConsistencyViolation) -> TreeError {
    error!(%violation, "Adapter tree consistency violation");
    TreeError::ConsistencyViolation(violation)
}
