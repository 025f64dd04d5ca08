//! File name padding, encodings and the obfuscation rotation.

use crate::consts::NAME_CIPHER_BLOCK_SIZE;
use crate::error::NameError;
use base64ct::{Base64UrlUnpadded, Encoding};

const BASE32HEX: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// The quote character of obfuscated names.
const QUOTE: char = '!';

/// Pad `data` into whole name cipher blocks (PKCS#7).
pub(crate) fn pad(data: &[u8]) -> Vec<[u8; NAME_CIPHER_BLOCK_SIZE]> {
    let n = NAME_CIPHER_BLOCK_SIZE - data.len() % NAME_CIPHER_BLOCK_SIZE;
    let mut blocks: Vec<_> = data
        .chunks(NAME_CIPHER_BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [n as u8; NAME_CIPHER_BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            block
        })
        .collect();

    if n == NAME_CIPHER_BLOCK_SIZE {
        blocks.push([n as u8; NAME_CIPHER_BLOCK_SIZE]);
    }
    blocks
}

/// Strip PKCS#7 padding.
pub(crate) fn unpad(data: &[u8]) -> Result<&[u8], NameError> {
    let n = *data.last().ok_or(NameError::BadPadding)? as usize;
    if n == 0 || n > NAME_CIPHER_BLOCK_SIZE || n > data.len() {
        return Err(NameError::BadPadding);
    }

    let (rest, padding) = data.split_at(data.len() - n);
    if padding.iter().any(|b| *b as usize != n) {
        return Err(NameError::BadPadding);
    }

    Ok(rest)
}

/// Encode bytes as lowercase base32hex without padding.
pub(crate) fn base32hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut acc: u16 = 0;
    let mut bits = 0;

    for byte in data {
        acc = (acc << 8) | *byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32HEX[((acc >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        out.push(BASE32HEX[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

/// Decode unpadded base32hex, in either case.
pub(crate) fn base32hex_decode(s: &str) -> Result<Vec<u8>, NameError> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut acc: u16 = 0;
    let mut bits = 0;

    for c in s.bytes() {
        let v = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'v' => c - b'a' + 10,
            b'A'..=b'V' => c - b'A' + 10,
            _ => return Err(NameError::BadEncoding),
        };
        acc = ((acc << 5) | v as u16) & 0x0fff;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }

    // Trailing groups of 1, 3 or 6 characters cannot come out of the encoder.
    if bits >= 5 {
        return Err(NameError::BadEncoding);
    }

    Ok(out)
}

/// The encoding applied to encrypted name segments.
pub(crate) fn encode(data: &[u8], encoding: super::FilenameEncoding) -> String {
    match encoding {
        super::FilenameEncoding::Base32 => base32hex_encode(data),
        super::FilenameEncoding::Base64 => Base64UrlUnpadded::encode_string(data),
    }
}

pub(crate) fn decode(s: &str, encoding: super::FilenameEncoding) -> Result<Vec<u8>, NameError> {
    match encoding {
        super::FilenameEncoding::Base32 => base32hex_decode(s),
        super::FilenameEncoding::Base64 => {
            Base64UrlUnpadded::decode_vec(s).map_err(|_| NameError::BadEncoding)
        }
    }
}

fn key_sum(name_key: &[u8]) -> u32 {
    name_key.iter().map(|b| *b as u32).sum()
}

/// Obfuscate a single name segment by rotating its characters.
///
/// The result is prefixed with the (unkeyed) rotation distance and a dot.
pub(crate) fn obfuscate_segment(name_key: &[u8], plain: &str) -> String {
    if plain.is_empty() {
        return String::new();
    }

    let mut dir = plain.chars().map(|c| c as u32).sum::<u32>() % 256;
    let mut out = format!("{dir}.");
    dir += key_sum(name_key);

    for c in plain.chars() {
        let r = c as u32;
        match c {
            QUOTE => {
                out.push(QUOTE);
                out.push(QUOTE);
            }
            '0'..='9' => {
                let thisdir = dir % 9 + 1;
                out.push(char_at('0' as u32 + (r - '0' as u32 + thisdir) % 10));
            }
            'A'..='Z' | 'a'..='z' => {
                let thisdir = dir % 25 + 1;
                let mut pos = r - 'A' as u32;
                if pos >= 26 {
                    pos -= 6;
                }
                pos = (pos + thisdir) % 52;
                if pos >= 26 {
                    pos += 6;
                }
                out.push(char_at('A' as u32 + pos));
            }
            '\u{a0}'..='\u{ff}' => {
                let thisdir = dir % 95 + 1;
                out.push(char_at(0xa0 + (r - 0xa0 + thisdir) % 96));
            }
            _ if r >= 0x100 => {
                let thisdir = dir % 127 + 1;
                let base = r - r % 256;
                match char::from_u32(base + (r - base + thisdir) % 256) {
                    Some(rotated) => out.push(rotated),
                    None => {
                        out.push(QUOTE);
                        out.push(c);
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Undo [`obfuscate_segment`].
pub(crate) fn deobfuscate_segment(name_key: &[u8], obfuscated: &str) -> Result<String, NameError> {
    if obfuscated.is_empty() {
        return Ok(String::new());
    }

    let (num, rest) = obfuscated
        .split_once('.')
        .ok_or(NameError::MissingRotation)?;

    if num == "!" {
        return Ok(rest.to_string());
    }

    let dir: u32 = num.parse().map_err(|_| NameError::MissingRotation)?;
    let dir = dir.wrapping_add(key_sum(name_key));

    let mut out = String::with_capacity(rest.len());
    let mut in_quote = false;

    for c in rest.chars() {
        let r = c as u32;
        if in_quote {
            out.push(c);
            in_quote = false;
            continue;
        }

        let plain = match c {
            QUOTE => {
                in_quote = true;
                continue;
            }
            '0'..='9' => {
                let thisdir = dir % 9 + 1;
                let offset = (r - '0' as u32 + 10 - thisdir) % 10;
                '0' as u32 + offset
            }
            'A'..='Z' | 'a'..='z' => {
                let thisdir = dir % 25 + 1;
                let mut pos = r - 'A' as u32;
                if pos >= 26 {
                    pos -= 6;
                }
                pos = (pos + 52 - thisdir) % 52;
                if pos >= 26 {
                    pos += 6;
                }
                'A' as u32 + pos
            }
            '\u{a0}'..='\u{ff}' => {
                let thisdir = dir % 95 + 1;
                0xa0 + (r - 0xa0 + 96 - thisdir) % 96
            }
            _ if r >= 0x100 => {
                let thisdir = dir % 127 + 1;
                let base = r - r % 256;
                base + (r - base + 256 - thisdir) % 256
            }
            _ => r,
        };

        out.push(char::from_u32(plain).ok_or(NameError::NotUtf8)?);
    }

    Ok(out)
}

/// Only called with code points computed inside an ASCII or Latin-1 range.
fn char_at(r: u32) -> char {
    char::from_u32(r).unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_unpad() {
        assert_eq!(pad(b""), vec![[16u8; 16]]);
        assert_eq!(pad(b"abc").len(), 1);
        assert_eq!(pad(&[0u8; 16]).len(), 2);

        for len in 0..40 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            assert_eq!(unpad(&pad(&data).concat()).unwrap(), &data[..]);
        }
    }

    #[test]
    fn test_unpad_rejects() {
        assert_eq!(unpad(b""), Err(NameError::BadPadding));

        let mut block = [3u8; 16];
        block[15] = 0;
        assert_eq!(unpad(&block), Err(NameError::BadPadding));

        block[15] = 17;
        assert_eq!(unpad(&block), Err(NameError::BadPadding));

        block[14] = 2;
        block[15] = 3;
        assert_eq!(unpad(&block), Err(NameError::BadPadding));
    }

    #[test]
    fn test_base32hex() {
        let cases: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"f", "co"),
            (b"fo", "cpng"),
            (b"foo", "cpnmu"),
            (b"foob", "cpnmuog"),
            (b"fooba", "cpnmuoj1"),
            (b"foobar", "cpnmuoj1e8"),
        ];

        for (plain, encoded) in cases {
            assert_eq!(&base32hex_encode(plain), encoded);
            assert_eq!(&base32hex_decode(encoded).unwrap(), plain);
            assert_eq!(&base32hex_decode(&encoded.to_uppercase()).unwrap(), plain);
        }
    }

    #[test]
    fn test_base32hex_rejects() {
        assert_eq!(base32hex_decode("cpnmu="), Err(NameError::BadEncoding));
        assert_eq!(base32hex_decode("wxyz"), Err(NameError::BadEncoding));
        // Impossible lengths.
        assert_eq!(base32hex_decode("c"), Err(NameError::BadEncoding));
        assert_eq!(base32hex_decode("cpn"), Err(NameError::BadEncoding));
        assert_eq!(base32hex_decode("cpnmuo"), Err(NameError::BadEncoding));
    }

    #[test]
    fn test_obfuscate_known_answers() {
        let key = [0u8; 32];
        let cases = [
            ("1", "49.6"),
            ("12", "99.23"),
            ("123", "150.890"),
            ("!hello", "53.!!lipps"),
            ("\u{a1}", "161.\u{e4}"),
            ("\u{3a0}", "160.\u{3c2}"),
            ("report.txt", "42.JwHGJL.LPL"),
        ];

        for (plain, obfuscated) in cases {
            assert_eq!(obfuscate_segment(&key, plain), obfuscated);
            assert_eq!(deobfuscate_segment(&key, obfuscated).unwrap(), plain);
        }
    }

    #[test]
    fn test_obfuscate_roundtrip_random_key() {
        let key: [u8; 32] = rand::random();
        let names = [
            "Hello, World",
            "zz top 99",
            "caf\u{e9} cr\u{e8}me",
            "\u{65e5}\u{672c}\u{8a9e}\u{30d5}\u{30a1}\u{30a4}\u{30eb}",
            "\u{1f600} emoji",
            "!!quoted!!",
        ];

        for name in names {
            let obfuscated = obfuscate_segment(&key, name);
            assert_eq!(deobfuscate_segment(&key, &obfuscated).unwrap(), name);
        }
    }

    #[test]
    fn test_deobfuscate_rejects() {
        let key = [0u8; 32];
        assert_eq!(
            deobfuscate_segment(&key, "no-rotation"),
            Err(NameError::MissingRotation)
        );
        assert_eq!(
            deobfuscate_segment(&key, "abc.def"),
            Err(NameError::MissingRotation)
        );
        assert_eq!(deobfuscate_segment(&key, "!.raw").unwrap(), "raw");
    }
}
