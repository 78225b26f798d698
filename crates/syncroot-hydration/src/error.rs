//! Error types for placeholder hydration.

use syncroot_core::domain::{AltId, SyncId, TransferError};
use syncroot_tree::TreeError;
use thiserror::Error;

/// Errors that can occur while servicing a hydration demand.
#[derive(Error, Debug)]
pub enum HydrationError {
    /// The demand names a platform id the adapter tree does not know. The
    /// demand is dropped; the OS retries on the next access.
    #[error("unknown placeholder: {0}")]
    UnknownPlaceholder(AltId),

    #[error("node {0} is a directory and has no content")]
    NotAFile(SyncId),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("content length lookup failed: {0}")]
    Source(String),

    #[error("placeholder update failed: {0}")]
    Placeholder(String),

    #[error("adapter tree error: {0}")]
    Tree(#[from] TreeError),
}

impl HydrationError {
    /// True when the demand was cancelled rather than failed
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HydrationError::Transfer(TransferError::Cancelled))
    }

    /// True for errors the OS resolves by retrying the access later
    pub fn is_dropped_demand(&self) -> bool {
        matches!(self, HydrationError::UnknownPlaceholder(_))
    }
}
