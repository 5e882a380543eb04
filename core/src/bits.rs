//! A bit-level writer and reader for the flag sequence of a partial merkle tree.
//!
//! Bit `i` of a logical sequence is stored in byte `i / 8` at bit position `i % 8`, with the
//! least-significant bit holding the lowest index. The same ordering is used for the bytes fed to
//! [`BitWriter::write_bits_from_bytes`], for the bytes produced by [`BitWriter::to_bytes`] and for
//! the bytes consumed by [`BitReader`], so any writer output round-trips through a reader.

use alloc::vec::Vec;
use bitvec::prelude::*;
use core::fmt;

/// The bit storage used for flag sequences.
pub type FlagBits = BitVec<u8, Lsb0>;

/// A read went past the end of the bit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange;

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bit read past the end of the sequence")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfRange {}

/// Accumulates individual bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitWriter {
    bits: FlagBits,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        BitWriter {
            bits: FlagBits::new(),
        }
    }

    /// Append one bit.
    pub fn write_bit(&mut self, value: bool) {
        self.bits.push(value);
    }

    /// Append the first `bit_count` bits of `bytes`.
    ///
    /// Panics if `bytes` holds fewer than `bit_count` bits.
    pub fn write_bits_from_bytes(&mut self, bytes: &[u8], bit_count: usize) {
        self.bits
            .extend_from_bitslice(&bytes.view_bits::<Lsb0>()[..bit_count]);
    }

    /// The number of bits written so far.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether no bits have been written.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Pack the accumulated bits into `ceil(len / 8)` bytes. Unused bits of the final byte are
    /// zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);
        bits.into_vec()
    }

    /// Consume the writer, yielding the accumulated bits.
    pub fn into_bits(self) -> FlagBits {
        self.bits
    }
}

/// Consumes bits from a fixed sequence, front to back.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Lsb0>,
    cursor: usize,
}

impl<'a> BitReader<'a> {
    /// Read the first `bit_len` bits of `bytes`.
    ///
    /// Panics if `bytes` holds fewer than `bit_len` bits.
    pub fn new(bytes: &'a [u8], bit_len: usize) -> Self {
        BitReader {
            bits: &bytes.view_bits::<Lsb0>()[..bit_len],
            cursor: 0,
        }
    }

    /// Read all bits of the given slice.
    pub fn from_bits(bits: &'a BitSlice<u8, Lsb0>) -> Self {
        BitReader { bits, cursor: 0 }
    }

    /// Read the next bit and advance the cursor.
    pub fn read_bit(&mut self) -> Result<bool, OutOfRange> {
        let bit = self.bits.get(self.cursor).map(|b| *b).ok_or(OutOfRange)?;
        self.cursor += 1;
        Ok(bit)
    }

    /// Read `bit_count` bits into an unsigned integer, least-significant bit first.
    ///
    /// Panics if `bit_count` is more than 64. On error the cursor is left untouched.
    pub fn read_uint(&mut self, bit_count: usize) -> Result<u64, OutOfRange> {
        assert!(bit_count <= 64, "cannot read more than 64 bits into a u64");
        if self.remaining() < bit_count {
            return Err(OutOfRange);
        }

        let mut value = 0u64;
        for i in 0..bit_count {
            if self.bits[self.cursor + i] {
                value |= 1 << i;
            }
        }
        self.cursor += bit_count;
        Ok(value)
    }

    /// The current cursor position, i.e. the number of bits consumed.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// The number of bits left to read.
    pub fn remaining(&self) -> usize {
        self.bits.len() - self.cursor
    }

    /// The total number of bits in the sequence.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the sequence holds no bits at all.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Compare the unread bits of `self` and `other` until either runs out. Neither cursor moves.
    pub fn same(&self, other: &BitReader<'_>) -> bool {
        self.bits[self.cursor..]
            .iter()
            .by_vals()
            .zip(other.bits[other.cursor..].iter().by_vals())
            .all(|(a, b)| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::{BitReader, BitWriter, OutOfRange};

    #[test]
    fn bytes_survive_a_whole_byte_round_trip() {
        let bytes = [0b1010_0001, 0xff, 0x00, 0x5a];
        let mut writer = BitWriter::new();
        writer.write_bits_from_bytes(&bytes, 32);
        assert_eq!(writer.to_bytes(), bytes);

        let mut writer = BitWriter::new();
        writer.write_bits_from_bytes(&bytes, 16);
        assert_eq!(writer.to_bytes(), &bytes[..2]);
    }

    #[test]
    fn lowest_index_is_least_significant_bit() {
        let mut writer = BitWriter::new();
        for bit in [true, false, false, true, true] {
            writer.write_bit(bit);
        }
        // trailing bits of the final byte are zero.
        assert_eq!(writer.to_bytes(), vec![0b0001_1001]);

        writer.write_bit(false);
        writer.write_bit(false);
        writer.write_bit(false);
        writer.write_bit(true);
        assert_eq!(writer.len(), 9);
        assert_eq!(writer.to_bytes(), vec![0b0001_1001, 0b0000_0001]);
    }

    #[test]
    fn partial_bytes_are_truncated() {
        let mut writer = BitWriter::new();
        writer.write_bits_from_bytes(&[0xff], 3);
        assert_eq!(writer.len(), 3);
        assert_eq!(writer.to_bytes(), vec![0b0000_0111]);
    }

    #[test]
    fn reader_reports_out_of_range() {
        let bytes = [0b0000_0101];
        let mut reader = BitReader::new(&bytes, 3);
        assert_eq!(reader.read_bit(), Ok(true));
        assert_eq!(reader.read_bit(), Ok(false));
        assert_eq!(reader.read_bit(), Ok(true));
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.read_bit(), Err(OutOfRange));
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn read_uint_is_lsb_first() {
        let bytes = [0b1101_0110, 0b0000_0011];
        let mut reader = BitReader::new(&bytes, 16);
        assert_eq!(reader.read_uint(4), Ok(0b0110));
        assert_eq!(reader.read_uint(6), Ok(0b11_1101));
        assert_eq!(reader.read_uint(7), Err(OutOfRange));
        assert_eq!(reader.position(), 10);
        assert_eq!(reader.read_uint(6), Ok(0));
    }

    #[test]
    fn same_compares_from_cursors() {
        let a = [0b0000_1100];
        let b = [0b0000_0011];
        let mut ra = BitReader::new(&a, 8);
        let rb = BitReader::new(&b, 4);
        assert!(!ra.same(&rb));

        ra.read_uint(2).unwrap();
        assert!(ra.same(&rb));
    }
}
