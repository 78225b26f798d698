//! Local file revisions.
//!
//! - [`LocalFileRevision`] reads a file, optionally limited to a byte range.
//!   It exposes a stream and can also push its content into a writer, so
//!   the same file can act as either kind of source.
//! - [`LocalFileDestination`] writes to `<name>.partial` next to the target
//!   and renames it into place on commit. Abandoning removes the partial
//!   file and leaves any previous content untouched.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use syncroot_core::domain::{ByteRange, TransferError};
use syncroot_core::ports::{
    ContentReader, ContentWriter, ReadableRevision, RemoteSourceRevision, RevisionSink,
    WritableRevision,
};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

// ============================================================================
// LocalFileRevision
// ============================================================================

/// A file on the local disk as a transfer source
#[derive(Debug, Clone)]
pub struct LocalFileRevision {
    path: PathBuf,
    range: ByteRange,
}

impl LocalFileRevision {
    /// Whole-file revision
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            range: ByteRange::full(),
        }
    }

    /// Restricts the revision to `range`
    #[must_use]
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = range;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<ContentReader, TransferError> {
        let mut file = File::open(&self.path).await.map_err(|e| {
            TransferError::Source(format!("cannot open {}: {e}", self.path.display()))
        })?;
        if self.range.offset > 0 {
            file.seek(SeekFrom::Start(self.range.offset)).await?;
        }
        let reader: ContentReader = match self.range.length {
            Some(length) => Box::new(file.take(length)),
            None => Box::new(file),
        };
        Ok(reader)
    }
}

#[async_trait]
impl ReadableRevision for LocalFileRevision {
    async fn open_content_stream(&self) -> Result<ContentReader, TransferError> {
        self.open().await
    }
}

#[async_trait]
impl RemoteSourceRevision for LocalFileRevision {
    async fn copy_content_to(
        &self,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut reader = self.open().await?;
        let copied = copy_until_cancelled(&mut *reader, &mut *writer, cancel).await?;
        writer.flush().await?;
        Ok(copied)
    }
}

// ============================================================================
// LocalFileDestination
// ============================================================================

/// A file on the local disk as a transfer destination
#[derive(Debug, Clone)]
pub struct LocalFileDestination {
    path: PathBuf,
    partial: PathBuf,
}

impl LocalFileDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        Self {
            path,
            partial: PathBuf::from(partial),
        }
    }

    /// Final location of the content
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where content is staged until commit
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    async fn create_partial(&self) -> Result<File, TransferError> {
        if let Some(parent) = self.partial.parent() {
            fs::create_dir_all(parent).await?;
        }
        File::create(&self.partial).await.map_err(|e| {
            TransferError::Destination(format!("cannot create {}: {e}", self.partial.display()))
        })
    }
}

#[async_trait]
impl RevisionSink for LocalFileDestination {
    async fn write_content(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut file = self.create_partial().await?;
        let written = copy_until_cancelled(reader, &mut file, cancel).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn commit(&self) -> Result<(), TransferError> {
        fs::rename(&self.partial, &self.path).await.map_err(|e| {
            TransferError::Destination(format!(
                "cannot move {} into place: {e}",
                self.partial.display()
            ))
        })?;
        debug!(path = %self.path.display(), "Destination committed");
        Ok(())
    }

    async fn abandon(&self) {
        match fs::remove_file(&self.partial).await {
            Ok(()) => debug!(path = %self.partial.display(), "Partial file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.partial.display(),
                error = %e,
                "Failed to remove partial file"
            ),
        }
    }
}

#[async_trait]
impl WritableRevision for LocalFileDestination {
    async fn open_content_stream(&self) -> Result<ContentWriter, TransferError> {
        Ok(Box::new(self.create_partial().await?))
    }
}

/// Copies until end-of-stream, checking `cancel` between chunks
async fn copy_until_cancelled(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    writer: &mut (dyn AsyncWrite + Send + Unpin),
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use syncroot_core::ports::{DestinationRevision, SourceRevision};
    use tempfile::TempDir;

    use super::*;
    use crate::engine::{TransferEngine, TransferStrategy};

    #[tokio::test]
    async fn upload_between_local_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("out/dst.bin");
        std::fs::write(&src, b"local content").unwrap();

        let report = TransferEngine::default()
            .transfer(
                SourceRevision::StreamBacked(Box::new(LocalFileRevision::new(&src))),
                DestinationRevision::StreamBacked(Box::new(LocalFileDestination::new(&dst))),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.bytes, 13);
        assert_eq!(std::fs::read(&dst).unwrap(), b"local content");
        assert!(!LocalFileDestination::new(&dst).partial_path().exists());
    }

    #[tokio::test]
    async fn download_shape_uses_destination_stream() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, vec![7u8; 200_000]).unwrap();

        let report = TransferEngine::default()
            .transfer(
                SourceRevision::OpaqueRemote(Box::new(LocalFileRevision::new(&src))),
                DestinationRevision::StreamBacked(Box::new(LocalFileDestination::new(&dst))),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.strategy, TransferStrategy::Download);
        assert_eq!(std::fs::read(&dst).unwrap().len(), 200_000);
    }

    #[tokio::test]
    async fn ranged_revision_reads_slice() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"0123456789").unwrap();

        let revision = LocalFileRevision::new(&src).with_range(ByteRange::new(2, 5).unwrap());
        let mut reader = revision.open_content_stream().await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "23456");
    }

    #[tokio::test]
    async fn missing_source_is_source_error_and_nothing_written() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst.bin");
        let existing = b"keep me";
        std::fs::write(&dst, existing).unwrap();

        let err = TransferEngine::default()
            .transfer(
                SourceRevision::StreamBacked(Box::new(LocalFileRevision::new(
                    dir.path().join("missing"),
                ))),
                DestinationRevision::StreamBacked(Box::new(LocalFileDestination::new(&dst))),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Source(_)));
        assert_eq!(std::fs::read(&dst).unwrap(), existing);
    }

    #[tokio::test]
    async fn abandon_removes_partial() {
        let dir = TempDir::new().unwrap();
        let dest = LocalFileDestination::new(dir.path().join("x.bin"));
        let mut writer = dest.open_content_stream().await.unwrap();
        writer.write_all(b"half").await.unwrap();
        writer.shutdown().await.unwrap();
        assert!(dest.partial_path().exists());

        dest.abandon().await;
        assert!(!dest.partial_path().exists());
        // abandoning twice is harmless
        dest.abandon().await;
    }
}
