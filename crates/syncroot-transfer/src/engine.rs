//! Revision transfer engine.
//!
//! Picks a strategy from the shape of the two endpoints and moves the
//! content across. Whatever the strategy, a failed transfer abandons the
//! destination write and a successful one commits it; no partial content is
//! ever finalized.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use syncroot_core::config::TransferConfig;
use syncroot_core::domain::TransferError;
use syncroot_core::ports::{
    DestinationRevision, ReadableRevision, RemoteSourceRevision, RevisionSink, SourceRevision,
    WritableRevision,
};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipe::pipe;

/// Default number of chunks buffered by a relay pipe
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Default relay chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Strategy and report
// ============================================================================

/// How the bytes move between the two endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStrategy {
    /// Read the source stream and push it through the destination sink
    Upload,
    /// Let the source push into the destination stream
    Download,
    /// Bridge two stream-less endpoints through a bounded pipe
    Relay,
}

impl TransferStrategy {
    /// Selects the strategy for a pair of endpoints
    pub fn select(source: &SourceRevision, destination: &DestinationRevision) -> Self {
        match (source, destination) {
            (SourceRevision::StreamBacked(_), _) => TransferStrategy::Upload,
            (SourceRevision::OpaqueRemote(_), DestinationRevision::StreamBacked(_)) => {
                TransferStrategy::Download
            }
            (SourceRevision::OpaqueRemote(_), DestinationRevision::OpaqueRemote(_)) => {
                TransferStrategy::Relay
            }
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::Upload => write!(f, "upload"),
            TransferStrategy::Download => write!(f, "download"),
            TransferStrategy::Relay => write!(f, "relay"),
        }
    }
}

/// Outcome of a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub strategy: TransferStrategy,
    /// Bytes committed to the destination
    pub bytes: u64,
}

// ============================================================================
// TransferEngine
// ============================================================================

/// Moves content between revisions.
///
/// The engine holds no per-transfer state; one instance can run any number
/// of transfers concurrently.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    pipe_capacity: usize,
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PIPE_CAPACITY, DEFAULT_CHUNK_SIZE)
    }
}

impl TransferEngine {
    /// Creates an engine.
    ///
    /// # Arguments
    ///
    /// * `pipe_capacity` - Chunks a relay may buffer before the producer waits
    /// * `chunk_size` - Largest chunk a relay moves at once, in bytes
    pub fn new(pipe_capacity: usize, chunk_size: usize) -> Self {
        Self {
            pipe_capacity: pipe_capacity.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Creates an engine from the `transfer` configuration section
    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(
            config.pipe_capacity_chunks as usize,
            config.chunk_size_bytes(),
        )
    }

    /// Transfers the content of `source` into `destination`.
    ///
    /// On success the destination has been committed. On failure it has been
    /// abandoned and the error is returned; retrying is up to the caller.
    ///
    /// The work runs on its own task under a child of `cancel`. Dropping the
    /// returned future cancels that child, and the task still abandons the
    /// destination before it exits.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Cancelled`] if `cancel` fired first
    /// - Whatever the endpoints reported; for a relay where both sides
    ///   failed, the producer's error wins
    pub async fn transfer(
        &self,
        source: SourceRevision,
        destination: DestinationRevision,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        let strategy = TransferStrategy::select(&source, &destination);
        let started = Instant::now();
        debug!(%strategy, "Starting transfer");

        let scope = cancel.child_token();
        let _guard = scope.clone().drop_guard();
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run(source, destination, &scope).await });
        let result = task
            .await
            .unwrap_or_else(|e| Err(task_failed("transfer", e)));

        match result {
            Ok(bytes) => {
                info!(
                    %strategy,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transfer completed"
                );
                Ok(TransferReport { strategy, bytes })
            }
            Err(e) if e.is_cancellation() => {
                debug!(%strategy, "Transfer cancelled");
                Err(e)
            }
            Err(e) => {
                warn!(%strategy, error = %e, "Transfer failed");
                Err(e)
            }
        }
    }

    /// Moves the content with the strategy the endpoints allow, then settles
    /// the destination
    async fn run(
        &self,
        source: SourceRevision,
        destination: DestinationRevision,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        match (source, destination) {
            (SourceRevision::StreamBacked(source), DestinationRevision::StreamBacked(dest)) => {
                let result = upload(&*source, &*dest, cancel).await;
                settle(&*dest, result).await
            }
            (SourceRevision::StreamBacked(source), DestinationRevision::OpaqueRemote(sink)) => {
                let result = upload(&*source, &*sink, cancel).await;
                settle(&*sink, result).await
            }
            (SourceRevision::OpaqueRemote(source), DestinationRevision::StreamBacked(dest)) => {
                let result = download(&*source, &*dest, cancel).await;
                settle(&*dest, result).await
            }
            (SourceRevision::OpaqueRemote(source), DestinationRevision::OpaqueRemote(sink)) => {
                let sink: Arc<dyn RevisionSink> = Arc::from(sink);
                let result = self.relay(Arc::from(source), Arc::clone(&sink), cancel).await;
                settle(&*sink, result).await
            }
        }
    }

    /// Runs the producer and consumer of a relay as two tasks sharing a
    /// child cancellation scope.
    ///
    /// Whichever task fails first cancels the scope, so the other side stops
    /// within one chunk instead of blocking on a full or empty pipe.
    async fn relay(
        &self,
        source: Arc<dyn RemoteSourceRevision>,
        sink: Arc<dyn RevisionSink>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let scope = cancel.child_token();
        let (mut writer, mut reader) = pipe(self.pipe_capacity, self.chunk_size);

        let producer = {
            let scope = scope.clone();
            tokio::spawn(async move {
                let result = cancellable(&scope, async {
                    let copied = source.copy_content_to(&mut writer, &scope).await;
                    match copied {
                        Ok(bytes) => {
                            writer.shutdown().await?;
                            Ok(bytes)
                        }
                        // the reader went away first; its error is the real one
                        Err(_) if writer.is_closed() => Err(TransferError::PipeClosed(
                            "consumer stopped reading".into(),
                        )),
                        Err(e) => Err(e),
                    }
                })
                .await;
                if result.is_err() {
                    scope.cancel();
                }
                result
            })
        };

        let consumer = {
            let scope = scope.clone();
            tokio::spawn(async move {
                let result = cancellable(&scope, sink.write_content(&mut reader, &scope)).await;
                if result.is_err() {
                    scope.cancel();
                }
                result
            })
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        let produced = produced.unwrap_or_else(|e| Err(task_failed("producer", e)));
        let consumed = consumed.unwrap_or_else(|e| Err(task_failed("consumer", e)));

        let (produced, consumed) = match (produced, consumed) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(p), Err(c)) => {
                let error = prefer_producer(p, c);
                if cancel.is_cancelled() && is_induced(&error) {
                    return Err(TransferError::Cancelled);
                }
                return Err(error);
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
        };

        if produced != consumed {
            return Err(TransferError::Destination(format!(
                "sink accepted {consumed} of {produced} bytes"
            )));
        }
        debug!(bytes = produced, "Relay drained");
        Ok(produced)
    }
}

// ============================================================================
// Strategy bodies
// ============================================================================

async fn upload<S>(
    source: &dyn ReadableRevision,
    sink: &S,
    cancel: &CancellationToken,
) -> Result<u64, TransferError>
where
    S: RevisionSink + ?Sized,
{
    cancellable(cancel, async {
        let mut reader = source.open_content_stream().await?;
        sink.write_content(&mut *reader, cancel).await
    })
    .await
}

async fn download(
    source: &dyn RemoteSourceRevision,
    destination: &dyn WritableRevision,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    cancellable(cancel, async {
        let mut writer = destination.open_content_stream().await?;
        let bytes = source.copy_content_to(&mut *writer, cancel).await?;
        writer.shutdown().await?;
        Ok(bytes)
    })
    .await
}

/// Commits after success, abandons after any failure (including a failed
/// commit)
async fn settle<S>(sink: &S, result: Result<u64, TransferError>) -> Result<u64, TransferError>
where
    S: RevisionSink + ?Sized,
{
    match result {
        Ok(bytes) => match sink.commit().await {
            Ok(()) => Ok(bytes),
            Err(e) => {
                sink.abandon().await;
                Err(e)
            }
        },
        Err(e) => {
            sink.abandon().await;
            Err(e)
        }
    }
}

/// Races `fut` against the token; the future is dropped on cancellation
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = fut => result,
    }
}

/// Errors a relay side reports only because the other side stopped first
fn is_induced(error: &TransferError) -> bool {
    matches!(error, TransferError::Cancelled | TransferError::PipeClosed(_))
}

/// Picks the error to report when both relay sides failed: the producer's,
/// unless it only failed because the consumer stopped
fn prefer_producer(produced: TransferError, consumed: TransferError) -> TransferError {
    if is_induced(&produced) && !is_induced(&consumed) {
        consumed
    } else {
        produced
    }
}

fn task_failed(side: &str, error: JoinError) -> TransferError {
    let message = format!("{side} task failed: {error}");
    if side == "producer" {
        TransferError::Source(message)
    } else {
        TransferError::Destination(message)
    }
}
