//! The interface between the stream adapters and the encryption transform.

use crate::error::{Error, NameError};
use std::fmt::Debug;
use std::io::Read;

/// A boxed blocking byte source.
pub type DataReader = Box<dyn Read + Send>;

/// A synchronous encryption transform.
///
/// Implementations are immutable once constructed and are shared between all streams of a
/// [`Session`][crate::session::Session], possibly running on several threads at once.
///
/// The sources handed to [`Transform::encrypt_data`] and [`Transform::decrypt_data`] are
/// connected to their chunk stream lazily. Implementations must not read from them before the
/// returned reader is read from itself.
pub trait Transform: Send + Sync + Debug {
    /// Encrypt a file name or path.
    fn encrypt_file_name(&self, name: &str) -> String;

    /// Decrypt a file name or path produced by [`Transform::encrypt_file_name`].
    fn decrypt_file_name(&self, name: &str) -> Result<String, NameError>;

    /// Wrap a plaintext source into a source of ciphertext.
    ///
    /// Errors returned here reject the stream before any bytes flow.
    fn encrypt_data(&self, plain: DataReader) -> Result<DataReader, Error>;

    /// Wrap a ciphertext source into a source of plaintext.
    ///
    /// Implementations may defer reading (and validating) the source until the first read, in
    /// which case corruption is reported by the returned reader.
    fn decrypt_data(&self, sealed: DataReader) -> Result<DataReader, Error>;
}
