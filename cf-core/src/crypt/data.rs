//! Block-wise sealing of data streams.

use crate::consts::*;
use crate::error::{DataError, StreamError};

use aead::generic_array::GenericArray;
use aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use rand::RngCore;
use std::fmt;
use std::io::{self, Read};

/// A 24 byte nonce which is incremented (little endian) after each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockNonce([u8; FILE_NONCE_SIZE]);

impl BlockNonce {
    pub(crate) fn random() -> Self {
        let mut nonce = [0u8; FILE_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self(nonce)
    }

    pub(crate) fn increment(&mut self) {
        for digit in self.0.iter_mut() {
            let (next, carry) = digit.overflowing_add(1);
            *digit = next;
            if !carry {
                return;
            }
        }
    }
}

/// Fill `buf` from `reader` until it is full, exhausted, or fails.
///
/// Returns the number of bytes read and the error, if any, that stopped the reader.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

/// Output staged for the consumer, plus the sticky terminal state.
#[derive(Default)]
struct Staged {
    buf: Vec<u8>,
    pos: usize,
    finished: bool,
    failed: Option<StreamError>,
}

impl Staged {
    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn stage(&mut self, buf: Vec<u8>) {
        self.buf = buf;
        self.pos = 0;
    }

    fn fail(&mut self, e: io::Error) -> io::Error {
        let e = StreamError::from(e);
        self.failed = Some(e.clone());
        e.into()
    }

    fn check(&self) -> io::Result<()> {
        match &self.failed {
            Some(e) => Err(e.clone().into()),
            None => Ok(()),
        }
    }
}

/// Encrypts a plaintext reader.
///
/// The header is produced by the first read, every following read produces (part of) one sealed
/// block.
pub struct Encrypter<R> {
    source: R,
    aead: XSalsa20Poly1305,
    nonce: BlockNonce,
    plain: Vec<u8>,
    staged: Staged,
    deferred: Option<io::Error>,
}

impl<R: Read> Encrypter<R> {
    pub(crate) fn new(source: R, data_key: &[u8; DATA_KEY_SIZE]) -> Self {
        Self::with_nonce(source, data_key, BlockNonce::random())
    }

    pub(crate) fn with_nonce(source: R, data_key: &[u8; DATA_KEY_SIZE], nonce: BlockNonce) -> Self {
        let mut header = Vec::with_capacity(FILE_HEADER_SIZE);
        header.extend_from_slice(FILE_MAGIC);
        header.extend_from_slice(&nonce.0);

        let mut staged = Staged::default();
        staged.stage(header);

        Self {
            source,
            aead: XSalsa20Poly1305::new(GenericArray::from_slice(data_key)),
            nonce,
            plain: vec![0u8; BLOCK_DATA_SIZE],
            staged,
            deferred: None,
        }
    }

    fn seal_next(&mut self) -> io::Result<()> {
        if let Some(e) = self.deferred.take() {
            return Err(self.staged.fail(e));
        }

        let (n, err) = read_full(&mut self.source, &mut self.plain);
        if n == 0 {
            return match err {
                Some(e) => Err(self.staged.fail(e)),
                None => {
                    self.staged.finished = true;
                    Ok(())
                }
            };
        }

        // Seal what was read, a source error is reported by the next read.
        self.deferred = err;

        let sealed = self
            .aead
            .encrypt(GenericArray::from_slice(&self.nonce.0), &self.plain[..n])
            .map_err(|_| self.staged.fail(io::Error::new(io::ErrorKind::Other, "failed to seal block")))?;

        self.nonce.increment();
        self.staged.stage(sealed);

        Ok(())
    }
}

impl<R: Read> Read for Encrypter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.staged.check()?;

        if self.staged.is_empty() && !self.staged.finished {
            self.seal_next()?;
        }

        Ok(self.staged.drain_into(buf))
    }
}

impl<R> fmt::Debug for Encrypter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypter")
            .field("nonce", &self.nonce)
            .field("finished", &self.staged.finished)
            .finish_non_exhaustive()
    }
}

/// Decrypts a sealed reader.
///
/// Nothing is read from the source until the first read, which consumes and validates the
/// header.
pub struct Decrypter<R> {
    source: R,
    aead: XSalsa20Poly1305,
    nonce: Option<BlockNonce>,
    sealed: Vec<u8>,
    staged: Staged,
    deferred: Option<io::Error>,
}

impl<R: Read> Decrypter<R> {
    pub(crate) fn new(source: R, data_key: &[u8; DATA_KEY_SIZE]) -> Self {
        Self {
            source,
            aead: XSalsa20Poly1305::new(GenericArray::from_slice(data_key)),
            nonce: None,
            sealed: vec![0u8; BLOCK_SIZE],
            staged: Staged::default(),
            deferred: None,
        }
    }

    fn read_header(&mut self) -> io::Result<BlockNonce> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        let (n, err) = read_full(&mut self.source, &mut header);

        if n < FILE_HEADER_SIZE {
            let e = err.unwrap_or_else(|| DataError::TooShort.into());
            return Err(self.staged.fail(e));
        }

        if &header[..FILE_MAGIC_SIZE] != FILE_MAGIC {
            return Err(self.staged.fail(DataError::BadMagic.into()));
        }

        let mut nonce = [0u8; FILE_NONCE_SIZE];
        nonce.copy_from_slice(&header[FILE_MAGIC_SIZE..]);

        Ok(BlockNonce(nonce))
    }

    fn open_next(&mut self, mut nonce: BlockNonce) -> io::Result<()> {
        if let Some(e) = self.deferred.take() {
            return Err(self.staged.fail(e));
        }

        let (n, err) = read_full(&mut self.source, &mut self.sealed);
        if n == 0 {
            return match err {
                Some(e) => Err(self.staged.fail(e)),
                None => {
                    self.staged.finished = true;
                    Ok(())
                }
            };
        }

        let opened = if n > BLOCK_HEADER_SIZE {
            self.aead
                .decrypt(GenericArray::from_slice(&nonce.0), &self.sealed[..n])
                .ok()
        } else {
            None
        };

        match (opened, err) {
            (Some(plain), err) => {
                self.deferred = err;
                nonce.increment();
                self.nonce = Some(nonce);
                self.staged.stage(plain);
                Ok(())
            }
            // A truncated block is better explained by the failure that truncated it.
            (None, Some(e)) => Err(self.staged.fail(e)),
            (None, None) => Err(self.staged.fail(DataError::BadBlock.into())),
        }
    }
}

impl<R: Read> Read for Decrypter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.staged.check()?;

        // Empty blocks only occur in corrupt streams, so a single refill suffices.
        if self.staged.is_empty() && !self.staged.finished {
            let nonce = match self.nonce {
                Some(nonce) => nonce,
                None => {
                    let nonce = self.read_header()?;
                    self.nonce = Some(nonce);
                    nonce
                }
            };
            self.open_next(nonce)?;
        }

        Ok(self.staged.drain_into(buf))
    }
}

impl<R> fmt::Debug for Decrypter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decrypter")
            .field("nonce", &self.nonce)
            .field("finished", &self.staged.finished)
            .finish_non_exhaustive()
    }
}
