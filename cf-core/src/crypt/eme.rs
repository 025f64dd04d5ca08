//! EME (ECB-Mix-ECB) wide-block encryption over AES-256.
//!
//! A length-preserving, tweakable mode where every output byte depends on every input byte.
//! The input is taken as whole AES blocks.

use crate::error::NameError;

use aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes::{Aes256, Block};

const BLOCK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Encrypt,
    Decrypt,
}

fn xor(a: &[u8; BLOCK], b: &[u8; BLOCK]) -> [u8; BLOCK] {
    let mut out = [0u8; BLOCK];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Multiply by the generator in GF(2^128), little endian.
fn mult_by_two(input: &[u8; BLOCK]) -> [u8; BLOCK] {
    let mut out = [0u8; BLOCK];
    out[0] = input[0].wrapping_shl(1);
    if input[BLOCK - 1] >= 0x80 {
        out[0] ^= 0x87;
    }
    for j in 1..BLOCK {
        out[j] = input[j].wrapping_shl(1) | (input[j - 1] >> 7);
    }
    out
}

fn aes_transform(cipher: &Aes256, block: &[u8; BLOCK], direction: Direction) -> [u8; BLOCK] {
    let mut b = Block::clone_from_slice(block);
    match direction {
        Direction::Encrypt => cipher.encrypt_block(&mut b),
        Direction::Decrypt => cipher.decrypt_block(&mut b),
    }
    let mut out = [0u8; BLOCK];
    out.copy_from_slice(&b);
    out
}

/// The table of L * 2^j, with L = 2 * AES(K, 0).
fn tabulate_l(cipher: &Aes256, m: usize) -> Vec<[u8; BLOCK]> {
    let mut li = aes_transform(cipher, &[0u8; BLOCK], Direction::Encrypt);
    (0..m)
        .map(|_| {
            li = mult_by_two(&li);
            li
        })
        .collect()
}

/// Split `data` into whole blocks.
pub(crate) fn blocks(data: &[u8]) -> Result<Vec<[u8; BLOCK]>, NameError> {
    let chunks = data.chunks_exact(BLOCK);
    if !chunks.remainder().is_empty() {
        return Err(NameError::NotAMultipleOfBlocksize);
    }

    Ok(chunks
        .map(|chunk| {
            let mut block = [0u8; BLOCK];
            block.copy_from_slice(chunk);
            block
        })
        .collect())
}

/// Transform `data` in the given direction. No blocks in, no bytes out.
pub(crate) fn transform(
    cipher: &Aes256,
    tweak: &[u8; BLOCK],
    data: &[[u8; BLOCK]],
    direction: Direction,
) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let l_table = tabulate_l(cipher, data.len());

    // PPPj = AES(K, Pj xor 2^(j-1) L)
    let mut c: Vec<[u8; BLOCK]> = data
        .iter()
        .zip(l_table.iter())
        .map(|(pj, l)| aes_transform(cipher, &xor(pj, l), direction))
        .collect();

    // MP = (xorSum PPPj) xor T
    let mp = c.iter().fold(*tweak, |acc, b| xor(&acc, b));
    let mc = aes_transform(cipher, &mp, direction);

    // CCCj = 2^(j-1) M xor PPPj, for j >= 2
    let mut mm = xor(&mp, &mc);
    for cj in c.iter_mut().skip(1) {
        mm = mult_by_two(&mm);
        *cj = xor(cj, &mm);
    }

    // CCC1 = (xorSum CCCj) xor T xor MC
    c[0] = c
        .iter()
        .skip(1)
        .fold(xor(&mc, tweak), |acc, b| xor(&acc, b));

    // Cj = AES(K, CCCj) xor 2^(j-1) L
    c.iter()
        .zip(l_table.iter())
        .flat_map(|(cj, l)| xor(&aes_transform(cipher, cj, direction), l))
        .collect()
}
