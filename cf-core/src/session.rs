//! Sessions tie a configured transform to the stream adapters.

use crate::consts::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY};
use crate::crypt::{Cipher, CipherConfig};
use crate::error::{Error, NameError, StreamError};
use crate::obscure::obscure;
use crate::stream::{CipherStream, StreamReader};
use crate::transform::{DataReader, Transform};

use bytes::Bytes;
use futures::Stream;
use std::io::{self, BufRead, Read};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

/// Tuning of the streams opened by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Signals buffered between either end of an adapter.
    pub queue_capacity: usize,
    /// The largest chunk emitted by an output stream.
    pub chunk_size: usize,
    /// The maximum number of streams open at once, if any.
    pub max_open_streams: Option<usize>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_open_streams: None,
        }
    }
}

/// The cipher configuration for a plaintext password and salt.
///
/// Both are obscured, an empty salt selects the default salt.
pub fn cipher_config(password: &str, salt: &str) -> CipherConfig {
    let config = CipherConfig::new(obscure(password));
    if salt.is_empty() {
        config
    } else {
        config.with_password2(obscure(salt))
    }
}

/// A configured transform, shared by all names and streams it processes.
///
/// Sessions are cheap to clone, clones share the transform.
#[derive(Debug)]
pub struct Session<T = Cipher> {
    transform: Arc<T>,
    options: StreamOptions,
    open_streams: Option<Arc<Semaphore>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            transform: self.transform.clone(),
            options: self.options,
            open_streams: self.open_streams.clone(),
        }
    }
}

impl Session<Cipher> {
    /// Initialize a session from a plaintext password and salt.
    pub fn initialize(password: &str, salt: &str) -> Result<Self, Error> {
        Self::with_config(&cipher_config(password, salt), StreamOptions::default())
    }

    /// Initialize a session from a cipher configuration.
    pub fn with_config(config: &CipherConfig, options: StreamOptions) -> Result<Self, Error> {
        let cipher = Cipher::new(config)?;
        log::info!("cipher created: {config:?}");

        Ok(Session::new(cipher, options))
    }
}

impl<T: Transform + 'static> Session<T> {
    /// A session around any transform.
    pub fn new(transform: T, options: StreamOptions) -> Self {
        Self {
            transform: Arc::new(transform),
            options,
            open_streams: options.max_open_streams.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// The transform.
    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// The stream options.
    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Encrypt a file name.
    pub fn encrypt_name(&self, name: &str) -> String {
        self.transform.encrypt_file_name(name)
    }

    /// Decrypt a file name.
    pub fn decrypt_name(&self, name: &str) -> Result<String, NameError> {
        self.transform.decrypt_file_name(name)
    }

    /// Encrypt a stream of plaintext chunks.
    ///
    /// Must be called from within a tokio runtime. A source without any bytes yields an output
    /// stream without any chunks.
    pub fn encrypt_stream<S>(&self, source: S) -> Result<CipherStream, Error>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        log::debug!("opening encryption stream");
        self.open(source, |transform, plain| transform.encrypt_data(plain))
    }

    /// Decrypt a stream of ciphertext chunks.
    ///
    /// Must be called from within a tokio runtime. Corrupt input is reported as an error item of
    /// the returned stream.
    pub fn decrypt_stream<S>(&self, source: S) -> Result<CipherStream, Error>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        log::debug!("opening decryption stream");
        self.open(source, |transform, sealed| transform.decrypt_data(sealed))
    }

    fn open<S, F>(&self, source: S, setup: F) -> Result<CipherStream, Error>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
        F: FnOnce(&T, DataReader) -> Result<DataReader, Error>,
    {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let permit = match &self.open_streams {
            Some(open) => Some(
                open.clone()
                    .try_acquire_owned()
                    .map_err(|_| Error::TooManyStreams)?,
            ),
            None => None,
        };

        let (connect, slot) = oneshot::channel();
        let handoff = Handoff {
            slot: Some(slot),
            reader: None,
            _permit: permit,
        };
        let transformed = setup(&self.transform, Box::new(handoff))?;

        let mut reader =
            StreamReader::with_capacity(runtime.clone(), source, self.options.queue_capacity);
        let upstream = reader.release_handle();

        let stream = CipherStream::spawn_with(
            &runtime,
            self.options.chunk_size,
            self.options.queue_capacity,
            move || {
                // An empty source never reaches the transform.
                if reader.fill_buf()?.is_empty() {
                    return Ok(None);
                }

                connect
                    .send(reader)
                    .map_err(|_| StreamError::Disconnected)?;
                Ok(Some(transformed))
            },
        );

        Ok(stream.with_upstream(upstream))
    }
}

/// The source of a transform, connected once the first chunk has arrived.
struct Handoff<S> {
    slot: Option<oneshot::Receiver<StreamReader<S>>>,
    reader: Option<StreamReader<S>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<S> Read for Handoff<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(mut slot) = self.slot.take() {
            let reader = slot.try_recv().map_err(|_| StreamError::Disconnected)?;
            self.reader = Some(reader);
        }

        match &mut self.reader {
            Some(reader) => reader.read(buf),
            None => Err(StreamError::Disconnected.into()),
        }
    }
}
