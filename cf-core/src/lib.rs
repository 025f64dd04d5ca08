//! # CryptoFlow core library
#![deny(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links
)]
//! CryptoFlow runs a blocking, [`Read`][std::io::Read]-based encryption transform over
//! asynchronous chunk streams, in both directions.
//!
//! The library is built from the following layers:
//!
//! * Transform: a synchronous filter that encrypts and decrypts file names and byte streams.
//! The bundled implementation, [`crypt::Cipher`], is compatible with the rclone crypt
//! format: scrypt key derivation, EME-encrypted names and XSalsa20-Poly1305 sealed blocks of 64
//! KiB.
//!
//! * Stream-to-blocking: [`stream::StreamReader`] exposes any
//! [`Stream`][futures::Stream] of [`Bytes`][bytes::Bytes] as a blocking reader. Pulls are issued
//! on a tokio runtime, at most one at a time, one chunk ahead of the consumer.
//!
//! * Blocking-to-stream: [`stream::CipherStream`] drives a blocking reader on a dedicated thread
//! and yields its output as a [`Stream`][futures::Stream] again.
//!
//! * Session: [`session::Session`] owns one configured transform and composes the adapters with
//! it. The [`bridge::Bridge`] and [`worker::Worker`] façades marshal sessions for a host
//! environment.
//!
//! ## Examples
//!
//! ### Names
//!
//! ```
//! use cf_core::session::Session;
//! # use cf_core::error::Error;
//!
//! # fn main() -> Result<(), Error> {
//! let session = Session::initialize("secret", "")?;
//!
//! let encrypted = session.encrypt_name("report.txt");
//! assert_eq!(session.decrypt_name(&encrypted)?, "report.txt");
//! # Ok(())
//! # }
//! ```
//!
//! ### Streams
//!
//! ```
//! use bytes::Bytes;
//! use cf_core::session::Session;
//! use futures::{stream, TryStreamExt};
//! # use cf_core::error::Error;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let session = Session::initialize("secret", "pepper")?;
//!
//! let source = stream::iter(vec![Ok(Bytes::from_static(b"SECRET DATA"))]);
//! let sealed: Vec<Bytes> = session.encrypt_stream(source)?.try_collect().await?;
//!
//! let opened: Vec<Bytes> = session
//!     .decrypt_stream(stream::iter(sealed.into_iter().map(Ok)))?
//!     .try_collect()
//!     .await?;
//!
//! assert_eq!(opened.concat(), b"SECRET DATA");
//! # Ok(())
//! # }
//! ```
//!
//! ### Wire format
//!
//! Encrypted streams have the following layout, followed by their length in bytes:
//!
//! ```text
//! HEADER (32) = MAGIC "RCLONE\0\0" (8) || NONCE (24)
//!
//! BLOCK (<= 65552) = TAG (16) || XSalsa20(PLAINTEXT (<= 65536))
//! ```
//!
//! The nonce is incremented (little endian) after every block.

pub mod api;
pub mod bridge;
pub mod consts;
pub mod crypt;
pub mod error;
pub mod obscure;
pub mod session;
pub mod stream;
pub mod transform;
pub mod worker;

#[doc(hidden)]
pub use consts::*;
