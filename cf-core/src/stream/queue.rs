//! The bounded queue carrying [`StreamSignal`]s between tasks and threads.

use super::StreamSignal;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// The receiving end of the queue has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk queue closed")
    }
}

impl std::error::Error for QueueClosed {}

/// Create a bounded chunk queue.
///
/// The queue enforces the signal grammar of a stream: once a terminal signal has been accepted,
/// every later signal (including duplicate terminals) is discarded.
pub fn chunk_queue(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let terminated = Arc::new(AtomicBool::new(false));

    (
        ChunkSender {
            tx,
            terminated: terminated.clone(),
        },
        ChunkReceiver { rx },
    )
}

/// The sending half of a chunk queue.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<StreamSignal>,
    terminated: Arc<AtomicBool>,
}

impl ChunkSender {
    /// Whether `signal` may still be enqueued. Claims the terminal slot for terminal signals.
    fn admit(&self, signal: &StreamSignal) -> bool {
        if signal.is_terminal() {
            self.terminated
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        } else {
            !self.terminated.load(Ordering::Acquire)
        }
    }

    /// Enqueue a signal, waiting for room.
    pub async fn deliver(&self, signal: StreamSignal) -> Result<(), QueueClosed> {
        if !self.admit(&signal) {
            log::trace!("discarding signal after end of stream");
            return Ok(());
        }
        self.tx.send(signal).await.map_err(|_| QueueClosed)
    }

    /// Enqueue a signal, blocking the current thread until there is room.
    ///
    /// Must not be called from within an asynchronous context.
    pub fn deliver_blocking(&self, signal: StreamSignal) -> Result<(), QueueClosed> {
        if !self.admit(&signal) {
            log::trace!("discarding signal after end of stream");
            return Ok(());
        }
        self.tx.blocking_send(signal).map_err(|_| QueueClosed)
    }

    /// Enqueue a signal if there is room right now.
    ///
    /// On a full queue the signal is handed back and, if it was terminal, the terminal slot is
    /// given up again.
    pub fn try_deliver(&self, signal: StreamSignal) -> Result<(), TryDeliverError> {
        if !self.admit(&signal) {
            return Ok(());
        }

        let terminal = signal.is_terminal();
        self.tx.try_send(signal).map_err(|e| match e {
            TrySendError::Full(signal) => {
                if terminal {
                    self.terminated.store(false, Ordering::Release);
                }
                TryDeliverError::Full(signal)
            }
            TrySendError::Closed(_) => TryDeliverError::Closed,
        })
    }

    /// Whether the receiver was dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether a terminal signal has been accepted.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// A sender that does not keep the queue open.
    pub fn downgrade(&self) -> WeakChunkSender {
        WeakChunkSender {
            tx: self.tx.downgrade(),
            terminated: self.terminated.clone(),
        }
    }
}

/// Why [`ChunkSender::try_deliver`] failed.
#[derive(Debug, PartialEq, Eq)]
pub enum TryDeliverError {
    /// The queue is full.
    Full(StreamSignal),
    /// The receiver has gone away.
    Closed,
}

/// A sender that does not keep the queue open, see [`ChunkSender::downgrade`].
#[derive(Clone)]
pub struct WeakChunkSender {
    tx: mpsc::WeakSender<StreamSignal>,
    terminated: Arc<AtomicBool>,
}

impl WeakChunkSender {
    /// Recover a sender, if any other sender is still alive.
    pub fn upgrade(&self) -> Option<ChunkSender> {
        self.tx.upgrade().map(|tx| ChunkSender {
            tx,
            terminated: self.terminated.clone(),
        })
    }
}

impl fmt::Debug for WeakChunkSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChunkSender")
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

/// The receiving half of a chunk queue.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::Receiver<StreamSignal>,
}

impl ChunkReceiver {
    /// Receive the next signal, `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<StreamSignal> {
        self.rx.recv().await
    }

    /// Receive the next signal, blocking the current thread.
    ///
    /// Must not be called from within an asynchronous context.
    pub fn recv_blocking(&mut self) -> Option<StreamSignal> {
        self.rx.blocking_recv()
    }

    /// Receive a signal if one is queued.
    pub fn try_recv(&mut self) -> Result<StreamSignal, TryRecvError> {
        self.rx.try_recv()
    }

    /// Poll for the next signal.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamSignal>> {
        self.rx.poll_recv(cx)
    }

    /// Refuse further signals. Queued signals can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
