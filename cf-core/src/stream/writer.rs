//! The blocking-to-stream adapter.

use super::{chunk_queue, ChunkReceiver, ChunkSender, ReleaseHandle, StreamSignal};
use crate::error::StreamError;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::io::{self, ErrorKind, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;

/// An asynchronous stream of chunks produced by a blocking reader.
///
/// The reader runs on tokio's blocking pool. It reads up to `chunk_size` bytes at a time and
/// hands every non-empty chunk to the stream through a bounded queue, so a slow consumer
/// throttles the reader.
///
/// Dropping the stream, or calling [`CipherStream::cancel`], stops the producer at its next
/// chunk boundary and drops the reader.
#[derive(Debug)]
pub struct CipherStream {
    queue: ChunkReceiver,
    upstream: Option<ReleaseHandle>,
    finished: bool,
}

impl CipherStream {
    /// Stream the output of `reader`.
    pub fn spawn<R>(runtime: &Handle, chunk_size: usize, capacity: usize, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with(runtime, chunk_size, capacity, move || Ok(Some(reader)))
    }

    /// Stream the output of the reader returned by `open`, which runs on the producer thread.
    ///
    /// When `open` returns `Ok(None)` the stream ends without any chunks, an error from `open`
    /// becomes the one and only item of the stream.
    pub fn spawn_with<R, F>(runtime: &Handle, chunk_size: usize, capacity: usize, open: F) -> Self
    where
        R: Read + Send + 'static,
        F: FnOnce() -> io::Result<Option<R>> + Send + 'static,
    {
        let (tx, rx) = chunk_queue(capacity);
        let chunk_size = chunk_size.max(1);

        runtime.spawn_blocking(move || match open() {
            Ok(Some(reader)) => produce(reader, chunk_size, &tx),
            Ok(None) => {
                let _ = tx.deliver_blocking(StreamSignal::EndOfStream);
            }
            Err(e) => {
                log::debug!("could not open stream: {e}");
                let _ = tx.deliver_blocking(StreamSignal::Error(e.into()));
            }
        });

        Self {
            queue: rx,
            upstream: None,
            finished: false,
        }
    }

    /// Release `upstream` when this stream is cancelled.
    pub fn with_upstream(mut self, upstream: ReleaseHandle) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Stop producing. Chunks already queued can still be received.
    pub fn cancel(&mut self) {
        if !self.finished {
            log::debug!("stream cancelled");
        }

        self.queue.close();
        if let Some(upstream) = self.upstream.take() {
            upstream.release();
        }
    }
}

/// Move everything `reader` produces into the queue, chunk by chunk.
fn produce<R: Read>(mut reader: R, chunk_size: usize, queue: &ChunkSender) {
    let mut total = 0u64;

    loop {
        if queue.is_closed() {
            log::debug!("consumer went away after {total} bytes");
            break;
        }

        let mut chunk = BytesMut::zeroed(chunk_size);
        let signal = match read_chunk(&mut reader, &mut chunk) {
            Ok(0) => StreamSignal::EndOfStream,
            Ok(n) => {
                chunk.truncate(n);
                total += n as u64;
                StreamSignal::Data(chunk.freeze())
            }
            Err(e) => StreamSignal::Error(e.into()),
        };

        let terminal = signal.is_terminal();
        if let StreamSignal::Error(e) = &signal {
            log::warn!("transform failed after {total} bytes: {e}");
        }

        if queue.deliver_blocking(signal).is_err() || terminal {
            break;
        }
    }

    log::trace!("producer done");
    drop(reader);
}

/// Read whatever `reader` has to offer, up to the size of `chunk`.
fn read_chunk<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

impl Stream for CipherStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        let item = match futures::ready!(self.queue.poll_recv(cx)) {
            Some(StreamSignal::Data(chunk)) => return Poll::Ready(Some(Ok(chunk))),
            Some(StreamSignal::EndOfStream) => None,
            Some(StreamSignal::Error(e)) => Some(Err(e.into())),
            // The producer vanished without a terminal signal.
            None => Some(Err(StreamError::Disconnected.into())),
        };

        self.finished = true;
        Poll::Ready(item)
    }
}

impl Drop for CipherStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{rand_vec, DropCounter};
    use futures::{StreamExt, TryStreamExt};
    use std::io::Cursor;
    use std::time::Duration;

    const LENGTHS: &[usize] = &[1, 100, 999, 1000, 1001, 10_000];

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chunks_reassemble() {
        let handle = Handle::current();

        for len in LENGTHS {
            let data = rand_vec(*len);
            let chunks: Vec<Bytes> = CipherStream::spawn(&handle, 1000, 2, Cursor::new(data.clone()))
                .try_collect()
                .await
                .unwrap();

            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 1000));
            assert_eq!(chunks.concat(), data);
        }
    }

    #[test]
    fn test_consumer_needs_no_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let data = rand_vec(5000);

        let stream = CipherStream::spawn(runtime.handle(), 512, 4, Cursor::new(data.clone()));
        let chunks: Vec<Bytes> = futures::executor::block_on(stream.try_collect()).unwrap();

        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_reader_gives_no_chunks() {
        let stream = CipherStream::spawn(&Handle::current(), 1000, 2, io::empty());
        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_ends_stream() {
        let failing = Cursor::new(vec![7u8; 2500]).chain(crate::test::FailingReader::new(
            ErrorKind::InvalidData,
            "bad block",
        ));
        let mut stream = CipherStream::spawn(&Handle::current(), 1000, 2, failing);

        let mut received = 0;
        let e = loop {
            match stream.next().await {
                Some(Ok(chunk)) => received += chunk.len(),
                Some(Err(e)) => break e,
                None => panic!("stream ended without error"),
            }
        };

        assert_eq!(received, 2500);
        assert_eq!(e.kind(), ErrorKind::InvalidData);
        assert_eq!(e.to_string(), "bad block");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_outcomes() {
        let handle = Handle::current();

        let nothing = CipherStream::spawn_with(&handle, 10, 1, || Ok(None::<io::Empty>));
        assert!(nothing.collect::<Vec<_>>().await.is_empty());

        let failed = CipherStream::spawn_with(&handle, 10, 1, || {
            Err::<Option<io::Empty>, _>(io::Error::new(ErrorKind::InvalidData, "bad magic"))
        });
        let items: Vec<_> = failed.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().to_string(), "bad magic");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_drops_reader_once() {
        let (reader, counter) = DropCounter::new(io::repeat(1));
        let mut stream = CipherStream::spawn(&Handle::current(), 100, 1, reader);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);
        drop(stream);

        for _ in 0..500 {
            if counter.drops() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.drops(), 1);

        // The producer is gone, so no further reads happen.
        let reads = counter.reads();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.reads(), reads);
        assert_eq!(counter.drops(), 1);
    }
}
