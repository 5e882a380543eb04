//! The byte encoding of partial merkle trees.
//!
//! ```text
//! transaction_count : u32, little-endian
//! hash_count        : compact size
//! hashes            : hash_count * 32 bytes
//! flag_byte_count   : compact size
//! flag bytes        : flag_byte_count bytes, lowest flag index in the least-significant bit
//! ```
//!
//! Compact sizes are the protocol's variable-length integers: values below `0xfd` take one byte,
//! larger values a marker byte (`0xfd`, `0xfe`, `0xff`) followed by a little-endian `u16`, `u32`
//! or `u64`. Only the shortest encoding of a value is accepted.

use crate::{partial_tree::PartialMerkleTree, tree::Hash};
use alloc::vec::Vec;
use core::fmt;

/// Errors in decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended early.
    UnexpectedEnd,
    /// A compact size was not encoded in its shortest form.
    NonCanonicalCompactSize,
    /// Bytes remained after the value was decoded.
    TrailingBytes(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEnd => f.write_str("unexpected end of input"),
            DecodeError::NonCanonicalCompactSize => f.write_str("non-canonical compact size"),
            DecodeError::TrailingBytes(n) => write!(f, "{} trailing bytes", n),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Append the compact size encoding of `n`.
pub fn encode_compact_size(n: u64, out: &mut Vec<u8>) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Read a compact size from the front of `input`, advancing it.
pub fn decode_compact_size(input: &mut &[u8]) -> Result<u64, DecodeError> {
    let marker = take::<1>(input)?[0];
    let (n, min) = match marker {
        0xfd => (u16::from_le_bytes(take(input)?) as u64, 0xfd),
        0xfe => (u32::from_le_bytes(take(input)?) as u64, 0x10000),
        0xff => (u64::from_le_bytes(take(input)?), 0x1_0000_0000),
        n => return Ok(n as u64),
    };

    if n < min {
        return Err(DecodeError::NonCanonicalCompactSize);
    }
    Ok(n)
}

fn take<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    if input.len() < N {
        return Err(DecodeError::UnexpectedEnd);
    }
    let (head, rest) = input.split_at(N);
    *input = rest;
    let mut buf = [0u8; N];
    buf.copy_from_slice(head);
    Ok(buf)
}

// a length prefix, checked against what is left of the input before anything is allocated.
fn decode_len(input: &mut &[u8], item_size: usize) -> Result<usize, DecodeError> {
    let n = decode_compact_size(input)?;
    let n = usize::try_from(n).map_err(|_| DecodeError::UnexpectedEnd)?;
    match n.checked_mul(item_size) {
        Some(bytes) if bytes <= input.len() => Ok(n),
        _ => Err(DecodeError::UnexpectedEnd),
    }
}

impl PartialMerkleTree {
    /// Append the encoding of the proof to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.transaction_count().to_le_bytes());
        encode_compact_size(self.hashes().len() as u64, out);
        for hash in self.hashes() {
            out.extend_from_slice(hash);
        }
        let flag_bytes = self.flag_bytes();
        encode_compact_size(flag_bytes.len() as u64, out);
        out.extend_from_slice(flag_bytes);
    }

    /// The encoding of the proof.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 9 + self.hashes().len() * 32 + 9);
        self.encode(&mut out);
        out
    }

    /// Decode a proof from the front of `input`, advancing it past the proof.
    ///
    /// This checks the encoding only. The proof itself is validated when extracted.
    pub fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let transaction_count = u32::from_le_bytes(take(input)?);

        let hash_count = decode_len(input, 32)?;
        let mut hashes: Vec<Hash> = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            hashes.push(take(input)?);
        }

        let flag_count = decode_len(input, 1)?;
        let (flag_bytes, rest) = input.split_at(flag_count);
        let flag_bytes = flag_bytes.to_vec();
        *input = rest;

        Ok(PartialMerkleTree::from_parts(
            transaction_count,
            hashes,
            flag_bytes,
        ))
    }

    /// Decode a proof which must span all of `bytes`.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        let proof = Self::decode(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(DecodeError::TrailingBytes(bytes.len()));
        }
        Ok(proof)
    }
}
