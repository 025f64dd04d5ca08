//! The façade a host environment talks to.
//!
//! A [`Bridge`] holds at most one [`Session`]. Every operation answers with a [`Reply`] or
//! [`Status`] instead of failing, and session operations answer `"not initialized"` until
//! [`Bridge::create_cipher`] has succeeded once.

use crate::api::{Reply, Status};
use crate::crypt::CipherConfig;
use crate::error::Error;
use crate::obscure;
use crate::session::{cipher_config, Session, StreamOptions};
use crate::stream::CipherStream;

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::sync::{PoisonError, RwLock};

/// Marshals sessions between a host and the library.
#[derive(Debug, Default)]
pub struct Bridge {
    session: RwLock<Option<Session>>,
    options: StreamOptions,
}

impl Bridge {
    /// A bridge without a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge whose sessions open streams with `options`.
    pub fn with_options(options: StreamOptions) -> Self {
        Self {
            session: RwLock::new(None),
            options,
        }
    }

    fn session(&self) -> Result<Session, Error> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Uninitialized)
    }

    /// Whether a session has been created.
    pub fn is_initialized(&self) -> bool {
        self.session().is_ok()
    }

    /// Create the session from a plaintext password and optional salt, replacing any previous
    /// session.
    pub fn create_cipher(&self, password: &str, salt: Option<&str>) -> Status {
        self.configure(&cipher_config(password, salt.unwrap_or_default()))
    }

    /// Create the session from a cipher configuration, replacing any previous session.
    ///
    /// On failure the previous session, if any, stays in place.
    pub fn configure(&self, config: &CipherConfig) -> Status {
        let created = Session::with_config(config, self.options).map(|session| {
            *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        });

        if let Err(e) = &created {
            log::warn!("could not create cipher: {e}");
        }

        created.into()
    }

    /// Encrypt a file name.
    pub fn encrypt_filename(&self, name: &str) -> Reply<String> {
        self.session().map(|s| s.encrypt_name(name)).into()
    }

    /// Decrypt a file name.
    pub fn decrypt_filename(&self, name: &str) -> Reply<String> {
        self.session()
            .and_then(|s| s.decrypt_name(name).map_err(Error::from))
            .into()
    }

    /// Encrypt a stream.
    pub fn encrypt_stream<S>(&self, source: S) -> Reply<CipherStream>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        self.session().and_then(|s| s.encrypt_stream(source)).into()
    }

    /// Decrypt a stream.
    pub fn decrypt_stream<S>(&self, source: S) -> Reply<CipherStream>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        self.session().and_then(|s| s.decrypt_stream(source)).into()
    }

    /// Obscure a password. Works without a session.
    pub fn obscure_password(&self, password: &str) -> Reply<String> {
        Reply::ok(obscure::obscure(password))
    }

    /// Reveal an obscured password. Works without a session.
    pub fn reveal_password(&self, obscured: &str) -> Reply<String> {
        obscure::reveal(obscured).into()
    }
}
