//! Reversible obscuring of passwords stored in configuration.
//!
//! Obscuring is _not_ encryption: the key is fixed and public. It only keeps passwords from being
//! read over someone's shoulder, and is compatible with `rclone obscure`.

use crate::error::Error;

use aes::Aes256;
use base64ct::{Base64UrlUnpadded, Encoding};
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_SIZE: usize = 16;

const CRYPT_KEY: [u8; 32] = [
    0x9c, 0x93, 0x5b, 0x48, 0x73, 0x0a, 0x55, 0x4d, 0x6b, 0xfd, 0x7c, 0x63, 0xc8, 0x86, 0xa9, 0x2b,
    0xd3, 0x90, 0x19, 0x8e, 0xb8, 0x12, 0x8a, 0xfb, 0xf4, 0xde, 0x16, 0x2b, 0x8b, 0x95, 0xf6, 0x38,
];

fn apply_keystream(iv: &[u8; IV_SIZE], data: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(&CRYPT_KEY), GenericArray::from_slice(iv));
    cipher.apply_keystream(data);
}

/// Obscure a password with a random IV.
pub fn obscure(plain: &str) -> String {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    obscure_with_iv(plain, &iv)
}

/// Obscure a password with the given IV.
pub fn obscure_with_iv(plain: &str, iv: &[u8; IV_SIZE]) -> String {
    let mut out = Vec::with_capacity(IV_SIZE + plain.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(plain.as_bytes());
    apply_keystream(iv, &mut out[IV_SIZE..]);

    Base64UrlUnpadded::encode_string(&out)
}

/// Reveal an obscured password.
pub fn reveal(obscured: &str) -> Result<String, Error> {
    let mut data = Base64UrlUnpadded::decode_vec(obscured).map_err(|_| {
        Error::Reveal("base64 decode failed when revealing password - is it obscured?".to_string())
    })?;

    if data.len() < IV_SIZE {
        return Err(Error::Reveal(
            "input too short when revealing password - is it obscured?".to_string(),
        ));
    }

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&data[..IV_SIZE]);
    apply_keystream(&iv, &mut data[IV_SIZE..]);

    String::from_utf8(data.split_off(IV_SIZE)).map_err(|_| {
        Error::Reveal("revealed password is not valid UTF-8 - is it obscured?".to_string())
    })
}

/// Whether a string looks like the output of [`obscure`].
///
/// A heuristic for hosts that accept either form: URL safe base64 longer than 10 characters.
pub fn looks_obscured(s: &str) -> bool {
    s.len() > 10
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
