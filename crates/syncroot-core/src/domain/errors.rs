//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! identifier parsing, validation failures and content transfer failures
//! reported across the revision ports.

use std::io;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid node name (empty, contains a separator, or reserved)
    #[error("Invalid node name: {0}")]
    InvalidName(String),

    /// Byte range that does not describe a valid span
    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failures of a content transfer between two revisions.
///
/// Returned by every revision port and by the transfer engine. A transfer
/// failure always means the destination write has been (or must be)
/// abandoned; retrying is the caller's decision.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Local I/O failure while reading or writing content
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source revision failed to produce content
    #[error("source revision failed: {0}")]
    Source(String),

    /// The destination revision failed to accept content
    #[error("destination revision failed: {0}")]
    Destination(String),

    /// The transfer was cancelled through its cancellation token
    #[error("transfer cancelled")]
    Cancelled,

    /// The other end of the relay pipe went away before the transfer finished
    #[error("relay pipe closed: {0}")]
    PipeClosed(String),
}

impl TransferError {
    /// Returns true when the failure is a cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidId("abc".to_string());
        assert_eq!(err.to_string(), "Invalid ID format: abc");

        let err = DomainError::InvalidName("a/b".to_string());
        assert_eq!(err.to_string(), "Invalid node name: a/b");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidRange("0+0".to_string());
        let err2 = DomainError::InvalidRange("0+0".to_string());
        let err3 = DomainError::InvalidRange("1+0".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_transfer_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        let err: TransferError = io_err.into();
        assert!(matches!(err, TransferError::Io(_)));
        assert!(!err.is_cancellation());
        assert!(TransferError::Cancelled.is_cancellation());
    }
}
