//! Adapters between asynchronous chunk streams and blocking readers.
//!
//! Data moves between the two worlds as [`StreamSignal`]s over a bounded [chunk
//! queue][chunk_queue]:
//!
//! ```text
//!            pull                                      read
//! Stream ---------> pump task --> ChunkQueue --> StreamReader: Read
//!
//!             read                                     poll_next
//! Read --------> producer thread --> ChunkQueue --> CipherStream: Stream
//! ```

mod queue;
mod reader;
mod writer;

pub use queue::{
    chunk_queue, ChunkReceiver, ChunkSender, QueueClosed, TryDeliverError, WeakChunkSender,
};
pub use reader::{Phase, ReleaseHandle, StreamReader};
pub use writer::CipherStream;

use crate::error::StreamError;
use bytes::Bytes;

/// A unit of transfer between the two ends of an adapter.
///
/// A stream consists of any number of [`StreamSignal::Data`] followed by exactly one terminal
/// signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// The next chunk of the stream.
    Data(Bytes),
    /// The stream ended normally.
    EndOfStream,
    /// The stream failed.
    Error(StreamError),
}

impl StreamSignal {
    /// Whether no signal may follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Data(_))
    }
}
