//! The stream-to-blocking adapter.

use super::{chunk_queue, ChunkReceiver, ChunkSender, StreamSignal, WeakChunkSender};
use crate::consts::{DEFAULT_QUEUE_CAPACITY, READAHEAD_CHUNKS};
use crate::error::StreamError;

use bytes::{Buf, Bytes};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

/// Where a [`StreamReader`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has been read yet.
    Created,
    /// Nothing is buffered, a pull is in flight or about to be issued.
    Prefetching,
    /// Chunks are buffered.
    Buffered,
    /// The source has ended but buffered bytes remain.
    Draining,
    /// Every byte has been read.
    Closed,
    /// The source failed or the reader was released.
    Failed,
}

enum Source<S> {
    /// Not pulled from yet.
    Idle(S, ChunkSender),
    /// Pulled by a pump task, one request per pull.
    Pumping(mpsc::Sender<()>),
    Gone,
}

#[derive(Debug, Clone)]
enum Terminal {
    End,
    Failed(StreamError),
}

/// State shared with [`ReleaseHandle`]s.
struct Shared {
    released: AtomicBool,
    queue: WeakChunkSender,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        // Wakes up a blocked read. A full queue means the reader is not blocked.
        if let Some(queue) = self.queue.upgrade() {
            let _ = queue.try_deliver(StreamSignal::Error(StreamError::Released));
        }

        self.abort_pump();
    }

    fn abort_pump(&self) {
        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

/// Releases a [`StreamReader`] from another thread or task.
///
/// Releasing stops pulling from the source, drops it, and makes any blocked or future read fail
/// with [`StreamError::Released`]. It is idempotent.
#[derive(Clone)]
pub struct ReleaseHandle {
    shared: Arc<Shared>,
}

impl ReleaseHandle {
    /// Release the reader.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Whether the reader has been released.
    pub fn is_released(&self) -> bool {
        self.shared.is_released()
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Pull from `source` once per request.
async fn pump<S>(mut source: S, mut requests: mpsc::Receiver<()>, queue: ChunkSender)
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    while requests.recv().await.is_some() {
        let signal = match source.next().await {
            Some(Ok(chunk)) => StreamSignal::Data(chunk),
            Some(Err(e)) => StreamSignal::Error(e.into()),
            None => StreamSignal::EndOfStream,
        };

        let terminal = signal.is_terminal();
        if queue.deliver(signal).await.is_err() || terminal {
            break;
        }
    }
}

/// A blocking reader over an asynchronous stream of chunks.
///
/// The stream is polled on a tokio runtime by a pump task which pulls exactly one chunk per
/// request. The reader requests the next chunk as soon as one arrives, so that the source works
/// on the next chunk while the consumer processes the current one, but never has more than one
/// pull in flight.
///
/// Reads block the calling thread. Use the reader from a blocking context such as
/// [`tokio::task::spawn_blocking`] or a plain thread, never from within an asynchronous task.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use cf_core::stream::StreamReader;
/// use futures::stream;
/// use std::io::Read;
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let source = stream::iter(vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))]);
///
/// let mut reader = StreamReader::new(runtime.handle().clone(), source);
/// let mut out = String::new();
/// reader.read_to_string(&mut out).unwrap();
/// assert_eq!(out, "hello world");
/// ```
pub struct StreamReader<S> {
    runtime: Handle,
    source: Source<S>,
    queue: ChunkReceiver,
    shared: Arc<Shared>,
    chunks: VecDeque<Bytes>,
    pending: bool,
    terminal: Option<Terminal>,
}

impl<S> StreamReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    /// Create a reader with the default queue capacity.
    ///
    /// Nothing is pulled from `source` until the first read.
    pub fn new(runtime: Handle, source: S) -> Self {
        Self::with_capacity(runtime, source, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a reader whose chunk queue holds `capacity` signals.
    pub fn with_capacity(runtime: Handle, source: S, capacity: usize) -> Self {
        let (tx, rx) = chunk_queue(capacity);
        let shared = Arc::new(Shared {
            released: AtomicBool::new(false),
            queue: tx.downgrade(),
            pump: Mutex::new(None),
        });

        Self {
            runtime,
            source: Source::Idle(source, tx),
            queue: rx,
            shared,
            chunks: VecDeque::with_capacity(READAHEAD_CHUNKS),
            pending: false,
            terminal: None,
        }
    }

    fn start(&mut self) {
        match std::mem::replace(&mut self.source, Source::Gone) {
            Source::Idle(source, queue) => {
                let (requests, pulls) = mpsc::channel(1);
                let pump = self.runtime.spawn(pump(source, pulls, queue));

                *self.shared.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
                if self.shared.is_released() {
                    self.shared.abort_pump();
                }

                log::debug!("started pulling from source");
                self.source = Source::Pumping(requests);
            }
            other => self.source = other,
        }
    }

    /// Issue the next pull, unless one is in flight.
    fn request(&mut self) {
        if self.pending || self.terminal.is_some() {
            return;
        }

        // A failed request means the pump is gone, which the queue reports by closing.
        if let Source::Pumping(requests) = &self.source {
            if requests.try_send(()).is_ok() {
                self.pending = true;
            }
        }
    }

    fn prefetch(&mut self) {
        if self.chunks.len() < READAHEAD_CHUNKS {
            self.request();
        }
    }

    fn absorb(&mut self, signal: Option<StreamSignal>) {
        // Every signal answers the one outstanding pull.
        self.pending = false;

        match signal {
            Some(StreamSignal::Data(chunk)) => {
                log::trace!("received chunk of {} bytes", chunk.len());
                if !chunk.is_empty() {
                    self.chunks.push_back(chunk);
                }
                self.prefetch();
            }
            Some(StreamSignal::EndOfStream) => self.finish(Terminal::End),
            Some(StreamSignal::Error(e)) => self.finish(Terminal::Failed(e)),
            None if self.shared.is_released() => {
                self.finish(Terminal::Failed(StreamError::Released))
            }
            None => self.finish(Terminal::Failed(StreamError::Disconnected)),
        }
    }

    /// Absorb whatever has arrived without blocking.
    fn collect_ready(&mut self) {
        while self.terminal.is_none() {
            match self.queue.try_recv() {
                Ok(signal) => self.absorb(Some(signal)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.absorb(None),
            }
        }
    }

    fn check_released(&mut self) {
        if !self.shared.is_released() || self.is_closed() {
            return;
        }
        if let Some(Terminal::Failed(_)) = self.terminal {
            return;
        }

        self.chunks.clear();
        self.terminal = None;
        self.finish(Terminal::Failed(StreamError::Released));
    }

    /// Release the source. Any further read fails, unless every byte was read already.
    pub fn release(&mut self) {
        self.shared.release();
        self.check_released();
    }

    /// A handle to release this reader from elsewhere.
    pub fn release_handle(&self) -> ReleaseHandle {
        ReleaseHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<S> StreamReader<S> {
    fn finish(&mut self, terminal: Terminal) {
        if self.terminal.is_some() {
            return;
        }

        match &terminal {
            Terminal::End => log::debug!("source ended"),
            Terminal::Failed(StreamError::Released) => log::debug!("source released"),
            Terminal::Failed(e) => log::warn!("source failed: {e}"),
        }

        self.terminal = Some(terminal);
        self.source = Source::Gone;
        self.shared.abort_pump();
    }

    fn is_closed(&self) -> bool {
        matches!(self.terminal, Some(Terminal::End)) && self.chunks.is_empty()
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        if self.is_closed() {
            return Phase::Closed;
        }
        if self.shared.is_released() {
            return Phase::Failed;
        }

        match (&self.terminal, &self.source) {
            (Some(Terminal::Failed(_)), _) => Phase::Failed,
            (Some(Terminal::End), _) => Phase::Draining,
            (None, Source::Idle(..)) => Phase::Created,
            (None, _) if self.chunks.is_empty() => Phase::Prefetching,
            (None, _) => Phase::Buffered,
        }
    }

    /// Number of bytes buffered and not yet read.
    pub fn buffered(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }
}

impl<S> BufRead for StreamReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check_released();
        self.collect_ready();

        while self.chunks.is_empty() {
            match &self.terminal {
                Some(Terminal::End) => return Ok(&[]),
                Some(Terminal::Failed(e)) => return Err(e.clone().into()),
                None => {}
            }

            self.start();
            self.request();

            let signal = self.queue.recv_blocking();
            self.absorb(signal);
            self.check_released();
        }

        Ok(&self.chunks[0][..])
    }

    fn consume(&mut self, mut amt: usize) {
        let mut popped = false;

        while amt > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            if amt >= front.len() {
                amt -= front.len();
                self.chunks.pop_front();
                popped = true;
            } else {
                front.advance(amt);
                amt = 0;
            }
        }

        if popped {
            self.collect_ready();
            self.prefetch();
        }
    }
}

impl<S> Read for StreamReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);

        Ok(n)
    }
}

impl<S> Drop for StreamReader<S> {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl<S> fmt::Debug for StreamReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader")
            .field("phase", &self.phase())
            .field("buffered", &self.buffered())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{chunked, rand_vec, Gauge, Lingering};
    use std::io::ErrorKind;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    const LENGTHS: &[usize] = &[0, 1, 7, 512, 4096, 65536 + 3, 3 * 65536];
    const CHUNK_SIZES: &[usize] = &[1, 100, 4096, 65536];

    fn read_all<R: Read>(mut reader: R, buf_size: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; buf_size];
        loop {
            match reader.read(&mut buf)? {
                0 => return Ok(out),
                n => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    #[test]
    fn test_reads_everything_in_order() {
        let runtime = Runtime::new().unwrap();

        for len in LENGTHS {
            for chunk_size in CHUNK_SIZES {
                let data = rand_vec(*len);
                let reader = StreamReader::new(runtime.handle().clone(), chunked(&data, *chunk_size));
                assert_eq!(read_all(reader, 1000).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_end_of_stream_is_idempotent() {
        let runtime = Runtime::new().unwrap();
        let mut reader = StreamReader::new(runtime.handle().clone(), chunked(b"abc", 2));

        assert_eq!(reader.phase(), Phase::Created);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.phase(), Phase::Closed);

        // The pump is gone, so a blocking read would hang forever.
        for _ in 0..10 {
            assert_eq!(reader.read(&mut buf).unwrap(), 0);
        }

        // Releasing a fully read reader keeps it closed.
        reader.release();
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_at_most_one_pull_in_flight() {
        let runtime = Runtime::new().unwrap();
        let (source, stats) = Gauge::new(50, 1000);
        let mut reader = StreamReader::new(runtime.handle().clone(), source);

        let mut buf = [0u8; 1000];
        for consumed in 1..=50 {
            assert_eq!(reader.read(&mut buf).unwrap(), 1000);
            assert!(stats.started() <= consumed + READAHEAD_CHUNKS + 1);
        }
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        assert_eq!(stats.max_in_flight(), 1);
        assert_eq!(stats.completed(), 50);
    }

    #[test]
    fn test_buffered_bytes_precede_error() {
        let runtime = Runtime::new().unwrap();
        let source = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
            Err(io::Error::new(ErrorKind::UnexpectedEof, "connection reset")),
            Ok(Bytes::from_static(b"never")),
        ]);
        let mut reader = StreamReader::new(runtime.handle().clone(), source);

        let mut out = Vec::new();
        let e = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(out, b"abcd");
        assert_eq!(e.kind(), ErrorKind::UnexpectedEof);
        assert_eq!(reader.phase(), Phase::Failed);

        // Errors are permanent.
        let mut buf = [0u8; 4];
        let again = reader.read(&mut buf).unwrap_err();
        assert_eq!(again.to_string(), "connection reset");
    }

    #[test]
    fn test_release_unblocks_read() {
        let runtime = Runtime::new().unwrap();
        let (source, dropped) = Lingering::new();
        let mut reader = StreamReader::new(runtime.handle().clone(), source);
        let handle = reader.release_handle();

        let (done_tx, done_rx) = std_mpsc::channel();
        let blocked = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let result = reader.read(&mut buf);
            done_tx.send(()).unwrap();
            result
        });

        // Nothing arrives, the read stays blocked.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        handle.release();
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("release did not unblock the read");

        let e = blocked.join().unwrap().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::ConnectionAborted);
        assert!(handle.is_released());

        assert!(dropped.wait(Duration::from_secs(5)), "source was not dropped");
    }

    #[test]
    fn test_release_before_first_read() {
        let runtime = Runtime::new().unwrap();
        let (source, dropped) = Lingering::new();
        let mut reader = StreamReader::new(runtime.handle().clone(), source);

        reader.release();
        reader.release();
        assert_eq!(reader.phase(), Phase::Failed);
        assert!(dropped.wait(Duration::from_secs(1)));

        let mut buf = [0u8; 16];
        assert_eq!(
            reader.read(&mut buf).unwrap_err().kind(),
            ErrorKind::ConnectionAborted
        );
    }

    #[test]
    fn test_drop_releases_source() {
        let runtime = Runtime::new().unwrap();
        let (source, dropped) = Lingering::with_prefix(Bytes::from_static(b"x"));
        let mut reader = StreamReader::new(runtime.handle().clone(), source);

        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        drop(reader);

        assert!(dropped.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_peek_empty_source() {
        let runtime = Runtime::new().unwrap();
        let mut reader = StreamReader::new(runtime.handle().clone(), futures::stream::empty());
        assert!(reader.fill_buf().unwrap().is_empty());
        assert_eq!(reader.phase(), Phase::Closed);
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let runtime = Runtime::new().unwrap();
        let source = futures::stream::iter(vec![
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"a")),
            Ok(Bytes::new()),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"b")),
        ]);
        let reader = StreamReader::new(runtime.handle().clone(), source);
        assert_eq!(read_all(reader, 8).unwrap(), b"ab");
    }

    #[test]
    fn test_phases() {
        let runtime = Runtime::new().unwrap();
        let mut reader = StreamReader::with_capacity(
            runtime.handle().clone(),
            chunked(&[1u8; 10], 5),
            1,
        );
        assert_eq!(reader.phase(), Phase::Created);

        assert_eq!(reader.fill_buf().unwrap().len(), 5);
        assert!(matches!(reader.phase(), Phase::Buffered));

        reader.consume(5);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![1u8; 5]);
        assert_eq!(reader.phase(), Phase::Closed);
    }
}
