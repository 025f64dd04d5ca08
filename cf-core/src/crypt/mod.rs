//! An rclone crypt compatible [`Transform`].
//!
//! Key material is derived from the (revealed) password with scrypt. File names are encrypted per
//! path segment with EME, data is sealed in blocks of 64 KiB with XSalsa20-Poly1305.

mod data;
mod eme;
mod names;

pub use data::{Decrypter, Encrypter};

use crate::consts::*;
use crate::error::{Error, NameError};
use crate::obscure::reveal;
use crate::transform::{DataReader, Transform};

use aes::cipher::KeyInit;
use aes::Aes256;
use eme::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How file names are encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameEncryption {
    /// Encrypt every path segment.
    #[default]
    Standard,
    /// Rotate characters, which hides names only from the casual observer.
    Obfuscate,
    /// Leave names as they are and append the suffix.
    Off,
}

impl FromStr for FilenameEncryption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "obfuscate" => Ok(Self::Obfuscate),
            "off" => Ok(Self::Off),
            _ => Err(Error::Config(format!("unknown filename encryption mode: {s}"))),
        }
    }
}

/// The encoding of encrypted name segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameEncoding {
    /// Lowercase base32hex, case insensitive on decryption.
    #[default]
    Base32,
    /// URL safe base64, for case sensitive backends.
    Base64,
}

impl FromStr for FilenameEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base32" => Ok(Self::Base32),
            "base64" => Ok(Self::Base64),
            "base32768" => Err(Error::Config("base32768 encoding is not supported".to_string())),
            _ => Err(Error::Config(format!("unknown filename encoding: {s}"))),
        }
    }
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

/// Configuration of a [`Cipher`].
///
/// Passwords are stored in their obscured form, see [`crate::obscure`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    /// The obscured password.
    pub password: String,
    /// The obscured salt, if empty the default salt is used.
    #[serde(default)]
    pub password2: String,
    /// How file names are encrypted.
    #[serde(default)]
    pub filename_encryption: FilenameEncryption,
    /// The encoding of encrypted names.
    #[serde(default)]
    pub filename_encoding: FilenameEncoding,
    /// Suffix for names when name encryption is off, `"none"` for no suffix.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl CipherConfig {
    /// A configuration with default name handling.
    pub fn new(obscured_password: impl Into<String>) -> Self {
        Self {
            password: obscured_password.into(),
            password2: String::new(),
            filename_encryption: FilenameEncryption::default(),
            filename_encoding: FilenameEncoding::default(),
            suffix: default_suffix(),
        }
    }

    /// Set the obscured salt.
    pub fn with_password2(mut self, obscured_salt: impl Into<String>) -> Self {
        self.password2 = obscured_salt.into();
        self
    }
}

impl fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherConfig")
            .field("password", &"***")
            .field("password2", &if self.password2.is_empty() { "" } else { "***" })
            .field("filename_encryption", &self.filename_encryption)
            .field("filename_encoding", &self.filename_encoding)
            .field("suffix", &self.suffix)
            .finish()
    }
}

/// Derive the data key, name key and name tweak.
///
/// An empty password derives an all zero key.
fn derive_keys(password: &str, salt: Option<&str>) -> Result<[u8; DERIVED_KEY_SIZE], Error> {
    let mut key = [0u8; DERIVED_KEY_SIZE];
    if password.is_empty() {
        return Ok(key);
    }

    let salt = match salt {
        Some(s) if !s.is_empty() => s.as_bytes(),
        _ => &DEFAULT_SALT[..],
    };

    // The output length is set by `key`. The length in `Params` only applies to PHC strings and
    // is capped at 64.
    let params = scrypt::Params::new(
        SCRYPT_LOG_N,
        SCRYPT_R,
        SCRYPT_P,
        scrypt::Params::RECOMMENDED_LEN,
    )
    .map_err(|e| Error::Config(format!("invalid key derivation parameters: {e}")))?;
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|e| Error::Config(format!("key derivation failed: {e}")))?;

    Ok(key)
}

/// An rclone crypt compatible cipher.
pub struct Cipher {
    data_key: [u8; DATA_KEY_SIZE],
    name_key: [u8; NAME_KEY_SIZE],
    name_tweak: [u8; NAME_TWEAK_SIZE],
    name_cipher: Aes256,
    mode: FilenameEncryption,
    encoding: FilenameEncoding,
    suffix: String,
}

impl Cipher {
    /// Construct a cipher from its configuration.
    pub fn new(config: &CipherConfig) -> Result<Self, Error> {
        if config.password.is_empty() {
            return Err(Error::Config("password not set in config".to_string()));
        }

        let password = reveal(&config.password)
            .map_err(|e| Error::Config(format!("failed to decrypt password: {e}")))?;

        let salt = match config.password2.as_str() {
            "" => None,
            obscured => Some(
                reveal(obscured)
                    .map_err(|e| Error::Config(format!("failed to decrypt password2: {e}")))?,
            ),
        };

        let suffix = match config.suffix.as_str() {
            s if s.eq_ignore_ascii_case("none") => String::new(),
            s if s.starts_with('.') => s.to_string(),
            s => {
                return Err(Error::Config(format!(
                    "suffix must start with a dot or be \"none\": {s}"
                )))
            }
        };

        Self::from_keys(
            &derive_keys(&password, salt.as_deref())?,
            config.filename_encryption,
            config.filename_encoding,
            suffix,
        )
    }

    fn from_keys(
        key: &[u8; DERIVED_KEY_SIZE],
        mode: FilenameEncryption,
        encoding: FilenameEncoding,
        suffix: String,
    ) -> Result<Self, Error> {
        let mut data_key = [0u8; DATA_KEY_SIZE];
        let mut name_key = [0u8; NAME_KEY_SIZE];
        let mut name_tweak = [0u8; NAME_TWEAK_SIZE];

        let (d, rest) = key.split_at(DATA_KEY_SIZE);
        let (n, t) = rest.split_at(NAME_KEY_SIZE);
        data_key.copy_from_slice(d);
        name_key.copy_from_slice(n);
        name_tweak.copy_from_slice(t);

        let name_cipher = Aes256::new_from_slice(&name_key)
            .map_err(|_| Error::Config("invalid name key length".to_string()))?;

        Ok(Self {
            data_key,
            name_key,
            name_tweak,
            name_cipher,
            mode,
            encoding,
            suffix,
        })
    }

    fn encrypt_segment(&self, plain: &str) -> String {
        if plain.is_empty() {
            return String::new();
        }

        let padded = names::pad(plain.as_bytes());
        let sealed =
            eme::transform(&self.name_cipher, &self.name_tweak, &padded, Direction::Encrypt);
        names::encode(&sealed, self.encoding)
    }

    fn decrypt_segment(&self, encoded: &str) -> Result<String, NameError> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let sealed = names::decode(encoded, self.encoding)?;
        let blocks = eme::blocks(&sealed)?;
        if blocks.is_empty() {
            return Err(NameError::TooShort);
        }
        if sealed.len() > MAX_ENCRYPTED_NAME_SIZE {
            return Err(NameError::TooLong);
        }

        let padded =
            eme::transform(&self.name_cipher, &self.name_tweak, &blocks, Direction::Decrypt);
        let plain = names::unpad(&padded)?;

        String::from_utf8(plain.to_vec()).map_err(|_| NameError::NotUtf8)
    }

    fn map_segments<F>(name: &str, f: F) -> Result<String, NameError>
    where
        F: Fn(&str) -> Result<String, NameError>,
    {
        let segments = name.split('/').map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(segments.join("/"))
    }
}

impl Transform for Cipher {
    fn encrypt_file_name(&self, name: &str) -> String {
        match self.mode {
            FilenameEncryption::Off => format!("{name}{}", self.suffix),
            FilenameEncryption::Standard => name
                .split('/')
                .map(|s| self.encrypt_segment(s))
                .collect::<Vec<_>>()
                .join("/"),
            FilenameEncryption::Obfuscate => name
                .split('/')
                .map(|s| names::obfuscate_segment(&self.name_key, s))
                .collect::<Vec<_>>()
                .join("/"),
        }
    }

    fn decrypt_file_name(&self, name: &str) -> Result<String, NameError> {
        match self.mode {
            FilenameEncryption::Off => match name.strip_suffix(self.suffix.as_str()) {
                Some(plain) if !plain.is_empty() => Ok(plain.to_string()),
                _ => Err(NameError::MissingSuffix),
            },
            FilenameEncryption::Standard => Self::map_segments(name, |s| self.decrypt_segment(s)),
            FilenameEncryption::Obfuscate => {
                Self::map_segments(name, |s| names::deobfuscate_segment(&self.name_key, s))
            }
        }
    }

    fn encrypt_data(&self, plain: DataReader) -> Result<DataReader, Error> {
        Ok(Box::new(Encrypter::new(plain, &self.data_key)))
    }

    fn decrypt_data(&self, sealed: DataReader) -> Result<DataReader, Error> {
        Ok(Box::new(Decrypter::new(sealed, &self.data_key)))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("mode", &self.mode)
            .field("encoding", &self.encoding)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}
