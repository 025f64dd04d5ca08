//! Constants used by the crypt format and the stream adapters.

/// The magic bytes with which all encrypted streams begin.
pub const FILE_MAGIC: &[u8; FILE_MAGIC_SIZE] = b"RCLONE\x00\x00";

/// The size of the magic.
pub const FILE_MAGIC_SIZE: usize = 8;

/// The size of the per-stream nonce.
pub const FILE_NONCE_SIZE: usize = 24;

/// The header contains the following bytes:
/// * Magic: 8 bytes,
/// * Nonce: 24 bytes,
/// * Totalling: 8 + 24 = 32 bytes.
pub const FILE_HEADER_SIZE: usize = FILE_MAGIC_SIZE + FILE_NONCE_SIZE;

/// Size of the authentication tag, which precedes every block.
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Size of the plaintext in a full block (64 KiB).
pub const BLOCK_DATA_SIZE: usize = 64 * 1024;

/// Size of a full encrypted block.
pub const BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + BLOCK_DATA_SIZE;

// Key material is derived in one go and split up afterwards.

/// Size of the key sealing the data blocks.
pub const DATA_KEY_SIZE: usize = 32;

/// Size of the key encrypting file names.
pub const NAME_KEY_SIZE: usize = 32;

/// Size of the tweak used for file name encryption.
pub const NAME_TWEAK_SIZE: usize = 16;

/// Total amount of key material derived from the password.
pub const DERIVED_KEY_SIZE: usize = DATA_KEY_SIZE + NAME_KEY_SIZE + NAME_TWEAK_SIZE;

/// The scrypt cost parameter, as a power of two (N = 16384).
pub const SCRYPT_LOG_N: u8 = 14;

/// The scrypt block size parameter.
pub const SCRYPT_R: u32 = 8;

/// The scrypt parallelization parameter.
pub const SCRYPT_P: u32 = 1;

/// Salt used when no secondary password is configured.
pub const DEFAULT_SALT: [u8; 16] = [
    0xA8, 0x0D, 0xF4, 0x3A, 0x8F, 0xBD, 0x03, 0x08, 0xA7, 0xCA, 0xB8, 0x3E, 0x58, 0x1F, 0x86, 0xB1,
];

/// Block size of the name cipher.
pub const NAME_CIPHER_BLOCK_SIZE: usize = 16;

/// Longest encrypted name segment accepted for decryption, after decoding.
pub const MAX_ENCRYPTED_NAME_SIZE: usize = 2048;

/// Suffix appended to names when name encryption is off.
pub const DEFAULT_SUFFIX: &str = ".bin";

/// Sessions a [`Worker`][crate::worker::Worker] keeps before evicting the least recently used.
pub const DEFAULT_CACHED_SESSIONS: usize = 64;

/// Default capacity of a chunk queue, in signals.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Default size of the chunks emitted by a [`CipherStream`][crate::stream::CipherStream].
///
/// A reasonable default is 64 KiB, matching the block size of the format.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks a [`StreamReader`][crate::stream::StreamReader] holds before it stops
/// prefetching.
pub const READAHEAD_CHUNKS: usize = 2;
