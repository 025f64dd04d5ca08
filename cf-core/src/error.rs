//! CryptoFlow errors.

use std::fmt;
use std::io;

/// A CryptoFlow error.
#[derive(Debug)]
pub enum Error {
    /// The transform rejected its configuration.
    Config(String),
    /// An operation was invoked before a session was initialized.
    Uninitialized,
    /// An encrypted name could not be decrypted.
    Name(NameError),
    /// The transform rejected the setup of a stream.
    Transform(String),
    /// A stream failed while pulling or pushing chunks.
    Stream(StreamError),
    /// An obscured secret could not be revealed.
    Reveal(String),
    /// Streams can only be opened from within a tokio runtime.
    NoRuntime,
    /// The maximum number of concurrently open streams was reached.
    TooManyStreams,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(s) => write!(f, "invalid configuration: {s}"),
            Self::Uninitialized => write!(f, "not initialized"),
            Self::Name(e) => write!(f, "failed to decrypt name: {e}"),
            Self::Transform(s) => write!(f, "failed to set up stream: {s}"),
            Self::Stream(e) => write!(f, "stream error: {e}"),
            Self::Reveal(s) => write!(f, "{s}"),
            Self::NoRuntime => write!(f, "no tokio runtime available to drive the stream"),
            Self::TooManyStreams => write!(f, "too many open streams"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Name(e) => Some(e),
            Self::Stream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NameError> for Error {
    fn from(e: NameError) -> Self {
        Self::Name(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Stream(e.into())
    }
}

/// Reasons an encrypted name is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    /// The name contains characters outside of the configured encoding.
    BadEncoding,
    /// The decoded name is not a multiple of the cipher block size.
    NotAMultipleOfBlocksize,
    /// The decoded name is empty.
    TooShort,
    /// The decoded name is longer than any name the cipher produces.
    TooLong,
    /// The decrypted name does not end in valid padding.
    BadPadding,
    /// The decrypted name is not valid UTF-8.
    NotUtf8,
    /// The name does not carry the configured suffix.
    MissingSuffix,
    /// An obfuscated name lacks its rotation prefix.
    MissingRotation,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadEncoding => "illegal character in encoded name",
            Self::NotAMultipleOfBlocksize => "not a multiple of blocksize",
            Self::TooShort => "too short to decrypt",
            Self::TooLong => "too long to decrypt",
            Self::BadPadding => "bad PKCS#7 padding",
            Self::NotUtf8 => "decrypted name is not valid UTF-8",
            Self::MissingSuffix => "not an encrypted file - no suffix",
            Self::MissingRotation => "not an encrypted file - no rotation prefix",
        };
        f.write_str(s)
    }
}

impl std::error::Error for NameError {}

/// Corruption detected while decrypting a data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataError {
    /// The stream ends before its header is complete.
    TooShort,
    /// The stream does not start with the expected magic.
    BadMagic,
    /// A block failed to authenticate.
    BadBlock,
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TooShort => "file is too short to be encrypted",
            Self::BadMagic => "not an encrypted file - bad magic string",
            Self::BadBlock => "failed to authenticate decrypted block - bad password?",
        };
        f.write_str(s)
    }
}

impl std::error::Error for DataError {}

impl From<DataError> for io::Error {
    fn from(e: DataError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// A failure observed while moving chunks across the bridge.
///
/// Stream errors are cloneable so a terminal error can be reported again on every subsequent
/// read, and they round-trip through [`io::Error`] without being wrapped twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// An I/O failure reported by either end.
    Io {
        /// The kind of the original error.
        kind: io::ErrorKind,
        /// The rendered original error.
        message: String,
    },
    /// The adapter was released while the stream was still in use.
    Released,
    /// The other end went away without terminating the stream.
    Disconnected,
}

impl StreamError {
    /// The [`io::ErrorKind`] under which this error is reported to readers.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Io { kind, .. } => *kind,
            Self::Released => io::ErrorKind::ConnectionAborted,
            Self::Disconnected => io::ErrorKind::BrokenPipe,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { message, .. } => f.write_str(message),
            Self::Released => write!(f, "stream was released"),
            Self::Disconnected => write!(f, "stream ended without end-of-stream signal"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        if let Some(inner) = e.get_ref().and_then(|r| r.downcast_ref::<StreamError>()) {
            return inner.clone();
        }

        // Interrupted is retried by readers, a terminal error must never look like it.
        let kind = match e.kind() {
            io::ErrorKind::Interrupted => io::ErrorKind::Other,
            kind => kind,
        };

        Self::Io {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        io::Error::new(e.kind(), e)
    }
}
