//! Single-lane chunked writer.
//!
//! Every outbound payload (typed text, backspace-replace, `:CFG:` commands)
//! goes through one FIFO queue served by one worker task:
//!
//! ```text
//! write(a) ─┐
//! write(b) ─┼─▶ [ job queue ] ─▶ worker ─▶ chunk 1 ─ 15 ms ─ chunk 2 ─ ... ─▶ sink
//! write(c) ─┘
//! ```
//!
//! [`ChunkedWriter::write`] enqueues at call time, not when the returned
//! future is first polled, so the order of calls is the order on the radio.
//! Only one chunk is ever in flight.
//!
//! # Write modes
//!
//! Unacknowledged writes are much faster on most stacks.  When the outbound
//! channel supports them each chunk is tried that way first and retried once
//! as an acknowledged write if the stack refuses.  A failure of the
//! acknowledged write fails the whole job; the remaining chunks of that job
//! are not sent, and the next job starts normally.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use typist_core::protocol::chunk::{chunk_count, chunk_payload, CHUNK_SIZE};

use crate::application::transport::{ChunkSink, TransportError, WriteMode};

/// Default pause between two chunks of one payload.
pub const DEFAULT_INTER_CHUNK_DELAY: Duration = Duration::from_millis(15);

/// A write job failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Chunk `index` (zero-based) of `total` could not be written.
    #[error("write failed at chunk {} of {total}: {source}", .index + 1)]
    Chunk {
        index: usize,
        total: usize,
        #[source]
        source: TransportError,
    },

    /// The worker task is gone (the session is shutting down).
    #[error("write lane closed")]
    LaneClosed,
}

/// Chunk size and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    pub chunk_size: usize,
    pub inter_chunk_delay: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            inter_chunk_delay: DEFAULT_INTER_CHUNK_DELAY,
        }
    }
}

struct WriteJob {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<(), WriteError>>,
}

/// Handle to the writer lane.  Dropping it lets the worker drain and exit.
pub struct ChunkedWriter {
    jobs: mpsc::UnboundedSender<WriteJob>,
}

impl ChunkedWriter {
    /// Spawns the worker task on the current runtime.
    pub fn spawn(sink: Arc<dyn ChunkSink>, settings: WriterSettings) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_lane(sink, settings, rx));
        Self { jobs }
    }

    /// Queues `payload` and returns a future for its outcome.
    ///
    /// The job is queued before this function returns.  Dropping the
    /// returned future does not cancel the write.  An empty payload is a
    /// valid job that completes once every earlier job has finished.
    pub fn write(
        &self,
        payload: impl Into<Vec<u8>>,
    ) -> impl Future<Output = Result<(), WriteError>> + Send + 'static {
        let (reply, outcome) = oneshot::channel();
        let queued = self
            .jobs
            .send(WriteJob {
                payload: payload.into(),
                reply,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(WriteError::LaneClosed);
            }
            outcome.await.unwrap_or(Err(WriteError::LaneClosed))
        }
    }
}

async fn run_lane(
    sink: Arc<dyn ChunkSink>,
    settings: WriterSettings,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
) {
    while let Some(job) = jobs.recv().await {
        let result = write_payload(sink.as_ref(), settings, &job.payload).await;
        if let Err(e) = &result {
            debug!(len = job.payload.len(), error = %e, "write job failed");
        }
        // The caller may have stopped waiting; that is fine.
        let _ = job.reply.send(result);
    }
    trace!("write lane closed");
}

async fn write_payload(
    sink: &dyn ChunkSink,
    settings: WriterSettings,
    payload: &[u8],
) -> Result<(), WriteError> {
    if payload.is_empty() {
        return Ok(());
    }

    let total = chunk_count(payload.len(), settings.chunk_size);
    let unacknowledged = sink
        .supports_unacknowledged()
        .await
        .map_err(|source| WriteError::Chunk {
            index: 0,
            total,
            source,
        })?;

    for (index, chunk) in chunk_payload(payload, settings.chunk_size).enumerate() {
        if index > 0 && !settings.inter_chunk_delay.is_zero() {
            tokio::time::sleep(settings.inter_chunk_delay).await;
        }
        write_chunk(sink, chunk, unacknowledged)
            .await
            .map_err(|source| WriteError::Chunk {
                index,
                total,
                source,
            })?;
    }
    trace!(len = payload.len(), chunks = total, "payload written");
    Ok(())
}

async fn write_chunk(
    sink: &dyn ChunkSink,
    chunk: &[u8],
    unacknowledged: bool,
) -> Result<(), TransportError> {
    if unacknowledged {
        match sink.write_chunk(chunk, WriteMode::WithoutResponse).await {
            Ok(()) => return Ok(()),
            Err(TransportError::NotConnected) => return Err(TransportError::NotConnected),
            Err(e) => debug!(error = %e, "unacknowledged write refused; retrying acknowledged"),
        }
    }
    sink.write_chunk(chunk, WriteMode::WithResponse).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    /// Records chunks; can refuse unacknowledged writes or fail a chunk.
    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<(WriteMode, Vec<u8>, Instant)>>,
        unacknowledged: bool,
        refuse_unacknowledged: bool,
        fail_on_chunk_starting_with: Option<u8>,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn supports_unacknowledged(&self) -> Result<bool, TransportError> {
            Ok(self.unacknowledged)
        }

        async fn write_chunk(&self, chunk: &[u8], mode: WriteMode) -> Result<(), TransportError> {
            if self.refuse_unacknowledged && mode == WriteMode::WithoutResponse {
                return Err(TransportError::Backend("not permitted".into()));
            }
            if self.fail_on_chunk_starting_with == chunk.first().copied() {
                return Err(TransportError::Backend("gatt error".into()));
            }
            self.chunks
                .lock()
                .unwrap()
                .push((mode, chunk.to_vec(), Instant::now()));
            Ok(())
        }
    }

    fn bytes_of(sink: &RecordingSink) -> Vec<u8> {
        sink.chunks
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, c, _)| c.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_complete_in_submission_order() {
        // Arrange
        let sink = Arc::new(RecordingSink::default());
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());
        let long = vec![b'a'; 45];

        // Act: issue all three before awaiting any
        let first = writer.write(long.clone());
        let second = writer.write(b"bb".to_vec());
        let third = writer.write(b"cc".to_vec());
        let results = (third.await, second.await, first.await);

        // Assert
        assert_eq!(results, (Ok(()), Ok(()), Ok(())));
        let mut expected = long;
        expected.extend_from_slice(b"bbcc");
        assert_eq!(bytes_of(&sink), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_at_most_twenty_bytes_and_paced() {
        // Arrange
        let sink = Arc::new(RecordingSink::default());
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());

        // Act
        writer.write(vec![b'x'; 41]).await.unwrap();

        // Assert
        let chunks = sink.chunks.lock().unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|(_, c, _)| c.len()).collect();
        assert_eq!(sizes, vec![20, 20, 1]);
        let gap = chunks[1].2 - chunks[0].2;
        assert!(gap >= DEFAULT_INTER_CHUNK_DELAY, "gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_uses_unacknowledged_when_supported() {
        let sink = Arc::new(RecordingSink {
            unacknowledged: true,
            ..Default::default()
        });
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());

        writer.write(b"hi".to_vec()).await.unwrap();

        assert_eq!(sink.chunks.lock().unwrap()[0].0, WriteMode::WithoutResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_acknowledged_when_refused() {
        let sink = Arc::new(RecordingSink {
            unacknowledged: true,
            refuse_unacknowledged: true,
            ..Default::default()
        });
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());

        writer.write(b"hi".to_vec()).await.unwrap();

        let chunks = sink.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, WriteMode::WithResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_does_not_stall_the_queue() {
        // Arrange: any chunk starting with 'F' fails
        let sink = Arc::new(RecordingSink {
            fail_on_chunk_starting_with: Some(b'F'),
            ..Default::default()
        });
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());

        // Act
        let bad = writer.write(b"Fail".to_vec());
        let good = writer.write(b"ok".to_vec());

        // Assert
        match bad.await {
            Err(WriteError::Chunk { index, total, .. }) => {
                assert_eq!((index, total), (0, 1));
            }
            other => panic!("expected chunk failure, got {other:?}"),
        }
        assert_eq!(good.await, Ok(()));
        assert_eq!(bytes_of(&sink), b"ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_is_a_barrier() {
        let sink = Arc::new(RecordingSink::default());
        let writer = ChunkedWriter::spawn(sink.clone(), WriterSettings::default());

        let _data = writer.write(vec![b'z'; 60]);
        writer.write(Vec::new()).await.unwrap();

        assert_eq!(bytes_of(&sink).len(), 60, "earlier job finished first");
    }

    #[test]
    fn test_write_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        tokio_test::block_on(async {
            let writer = ChunkedWriter::spawn(
                Arc::new(RecordingSink::default()),
                WriterSettings::default(),
            );
            assert_send(&writer.write(b"x".to_vec()));
        });
    }

    #[test]
    fn test_chunk_error_message_is_one_based() {
        let err = WriteError::Chunk {
            index: 2,
            total: 5,
            source: TransportError::NotConnected,
        };
        assert_eq!(err.to_string(), "write failed at chunk 3 of 5: not connected");
    }
}
