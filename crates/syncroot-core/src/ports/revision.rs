//! Revision ports (content endpoints)
//!
//! A revision is a content handle on either side of a transfer. Whether it
//! can hand out a direct stream is a property of its variant, not a runtime
//! flag, so strategy selection in the transfer engine is an exhaustive match.
//!
//! ## Design Notes
//!
//! - A local revision always exposes a stream; a typical remote revision
//!   does not and can only push into (source) or pull from (destination)
//!   a stream the caller provides.
//! - Every destination exposes [`RevisionSink::write_content`], even when it
//!   also offers a direct stream.
//! - Errors are [`TransferError`] so the engine can tell cancellation apart
//!   from faults without downcasting.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::domain::TransferError;

/// Boxed readable content stream
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed writable content stream
pub type ContentWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// Source side
// ============================================================================

/// A source revision that exposes a direct readable stream
#[async_trait]
pub trait ReadableRevision: Send + Sync {
    /// Opens the revision content for reading from the first byte
    async fn open_content_stream(&self) -> Result<ContentReader, TransferError>;
}

/// A source revision without a direct stream.
///
/// The revision pushes its content into a writer supplied by the caller.
/// Implementations write every byte in order and flush, but do not shut the
/// writer down; the caller owns end-of-stream.
#[async_trait]
pub trait RemoteSourceRevision: Send + Sync {
    /// Copies the full content into `writer`, returning the number of bytes copied
    async fn copy_content_to(
        &self,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError>;
}

/// Content source of a transfer
pub enum SourceRevision {
    /// Exposes a readable stream (typically local)
    StreamBacked(Box<dyn ReadableRevision>),
    /// Can only push content into a caller-provided writer (typically remote)
    OpaqueRemote(Box<dyn RemoteSourceRevision>),
}

impl SourceRevision {
    /// Returns true when the source exposes a direct stream
    pub fn can_get_content_stream(&self) -> bool {
        matches!(self, SourceRevision::StreamBacked(_))
    }
}

impl std::fmt::Debug for SourceRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRevision::StreamBacked(_) => write!(f, "SourceRevision::StreamBacked"),
            SourceRevision::OpaqueRemote(_) => write!(f, "SourceRevision::OpaqueRemote"),
        }
    }
}

// ============================================================================
// Destination side
// ============================================================================

/// The write sink every destination revision exposes
#[async_trait]
pub trait RevisionSink: Send + Sync {
    /// Reads `reader` to end-of-stream and stores it as the revision content,
    /// returning the number of bytes written
    async fn write_content(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError>;

    /// Makes fully written content the revision's content
    async fn commit(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// Discards any partially written content. Must not fail.
    async fn abandon(&self);
}

/// A destination revision that additionally exposes a direct writable stream
#[async_trait]
pub trait WritableRevision: RevisionSink {
    /// Opens the revision content for writing from the first byte
    async fn open_content_stream(&self) -> Result<ContentWriter, TransferError>;
}

/// Content destination of a transfer
pub enum DestinationRevision {
    /// Exposes a writable stream in addition to the sink (typically local)
    StreamBacked(Box<dyn WritableRevision>),
    /// Only the sink is available (typically remote)
    OpaqueRemote(Box<dyn RevisionSink>),
}

impl DestinationRevision {
    /// Returns true when the destination exposes a direct stream
    pub fn can_get_content_stream(&self) -> bool {
        matches!(self, DestinationRevision::StreamBacked(_))
    }

    /// Commits the written content, whichever variant this is
    pub async fn commit(&self) -> Result<(), TransferError> {
        match self {
            DestinationRevision::StreamBacked(revision) => revision.commit().await,
            DestinationRevision::OpaqueRemote(sink) => sink.commit().await,
        }
    }

    /// Abandons the in-progress write, whichever variant this is
    pub async fn abandon(&self) {
        match self {
            DestinationRevision::StreamBacked(revision) => revision.abandon().await,
            DestinationRevision::OpaqueRemote(sink) => sink.abandon().await,
        }
    }
}

impl std::fmt::Debug for DestinationRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationRevision::StreamBacked(_) => write!(f, "DestinationRevision::StreamBacked"),
            DestinationRevision::OpaqueRemote(_) => write!(f, "DestinationRevision::OpaqueRemote"),
        }
    }
}
