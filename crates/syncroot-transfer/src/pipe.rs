//! Bounded inverting pipe.
//!
//! Turns a "push into a writer" producer and a "pull from a reader" consumer
//! into one single-producer/single-consumer byte stream. Chunks travel over
//! a bounded `mpsc` channel, so at most `capacity` chunks of `chunk_size`
//! bytes are buffered and a fast producer is held back by a slow consumer.
//!
//! - Shutting the [`PipeWriter`] down is end-of-stream for the reader.
//! - Dropping the [`PipeReader`] makes further writes fail with
//!   `BrokenPipe`.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Creates a connected writer/reader pair.
///
/// # Arguments
///
/// * `capacity` - Maximum number of chunks in flight (at least 1)
/// * `chunk_size` - Maximum size of one chunk in bytes (at least 1)
pub fn pipe(capacity: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            sender: PollSender::new(tx),
            chunk_size: chunk_size.max(1),
        },
        PipeReader {
            receiver: rx,
            pending: Bytes::new(),
        },
    )
}

// ============================================================================
// Writer
// ============================================================================

/// Producer half of a [`pipe`]
pub struct PipeWriter {
    sender: PollSender<Bytes>,
    chunk_size: usize,
}

impl PipeWriter {
    /// True once the reader is gone or the writer was shut down
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if ready!(self.sender.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(broken_pipe()));
        }
        let len = buf.len().min(self.chunk_size);
        let chunk = Bytes::copy_from_slice(&buf[..len]);
        match self.sender.send_item(chunk) {
            Ok(()) => Poll::Ready(Ok(len)),
            Err(_) => Poll::Ready(Err(broken_pipe())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // every accepted chunk is already in the channel
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.sender.close();
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Consumer half of a [`pipe`]
pub struct PipeReader {
    receiver: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if !self.pending.is_empty() {
                let len = self.pending.len().min(buf.remaining());
                let chunk = self.pending.split_to(len);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }
            match ready!(self.receiver.poll_recv(cx)) {
                Some(chunk) => self.pending = chunk,
                // all senders gone: end of stream
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn bytes_arrive_in_order() {
        let (mut writer, mut reader) = pipe(2, 4);
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let expected = payload.clone();

        let producer = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        producer.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn writes_are_split_into_chunks() {
        let (mut writer, _reader) = pipe(8, 3);
        let written = writer.write(b"abcdefgh").await.unwrap();
        assert_eq!(written, 3);
    }

    #[tokio::test]
    async fn shutdown_is_end_of_stream() {
        let (mut writer, mut reader) = pipe(1, 16);
        writer.shutdown().await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_reader_breaks_writer() {
        let (mut writer, reader) = pipe(1, 16);
        drop(reader);
        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn full_pipe_blocks_writer() {
        let (mut writer, mut reader) = pipe(1, 4);
        writer.write_all(b"abcd").await.unwrap();

        // channel holds one chunk; the next write has to wait for the reader
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), writer.write_all(b"efgh"))
                .await;
        assert!(blocked.is_err());

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcd");
        writer.write_all(b"efgh").await.unwrap();
    }
}
