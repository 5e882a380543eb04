//! Hashers (feature-gated) and utilities for implementing them.

use crate::tree::Hash;

/// The hash function combining two child hashes into their parent.
///
/// A node with a single child is hashed by passing the child as both `left` and `right`. This
/// reproduces the historical format exactly, including its weakness: a row ending in `[.., X]`
/// and a row ending in `[.., X, X]` produce the same parent. See
/// [`crate::Options::reject_duplicate_subtrees`].
pub trait MerkleHasher {
    /// Hash the concatenation of `left` and `right`.
    fn hash_pair(left: &Hash, right: &Hash) -> Hash;
}

/// A simple trait for representing binary hash functions.
pub trait BinaryHash {
    /// Given a bit-string, produce a 32-byte hash.
    fn hash(input: &[u8]) -> [u8; 32];

    /// An optional specialization of `hash` where there are two 32-byte inputs, left and right.
    fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut buf = [0u8; 64];
        buf[0..32].copy_from_slice(left);
        buf[32..64].copy_from_slice(right);
        Self::hash(&buf)
    }
}

/// A [`MerkleHasher`] constructed from a simple binary hasher.
///
/// The parent of two nodes is the binary hash of their concatenation, with no domain separation
/// between leaves and internal nodes.
pub struct BinaryHasher<H>(core::marker::PhantomData<H>);

impl<H: BinaryHash> MerkleHasher for BinaryHasher<H> {
    fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        H::hash2_32_concat(left, right)
    }
}

#[cfg(any(feature = "blake3-hasher", test))]
pub use blake3::Blake3Hasher;

/// A merkle hasher making use of blake3.
#[cfg(any(feature = "blake3-hasher", test))]
pub mod blake3 {
    use super::{BinaryHash, BinaryHasher};

    /// A [`BinaryHash`] implementation for Blake3.
    pub struct Blake3BinaryHasher;

    /// A merkle hasher combining children with Blake3.
    pub type Blake3Hasher = BinaryHasher<Blake3BinaryHasher>;

    impl BinaryHash for Blake3BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            blake3::hash(value).into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = blake3::Hasher::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }
}

#[cfg(any(feature = "sha2-hasher", test))]
pub use sha2::{Sha256dHasher, Sha2Hasher};

/// Merkle hashers making use of sha2-256.
#[cfg(any(feature = "sha2-hasher", test))]
pub mod sha2 {
    use super::{BinaryHash, BinaryHasher};
    use sha2::{Digest, Sha256};

    /// A [`BinaryHash`] implementation for Sha2.
    pub struct Sha2BinaryHasher;

    /// A [`BinaryHash`] implementation for double sha2-256, i.e. `sha256(sha256(x))`.
    pub struct Sha256dBinaryHasher;

    /// A merkle hasher combining children with a single round of sha2-256.
    pub type Sha2Hasher = BinaryHasher<Sha2BinaryHasher>;

    /// A merkle hasher combining children with double sha2-256. This is the block-chain default.
    pub type Sha256dHasher = BinaryHasher<Sha256dBinaryHasher>;

    impl BinaryHash for Sha2BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(value);
            hasher.finalize().into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }

    impl BinaryHash for Sha256dBinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            Sha256::digest(Sha256::digest(value)).into()
        }

        fn hash2_32_concat(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(left);
            hasher.update(right);
            Sha256::digest(hasher.finalize()).into()
        }
    }
}
