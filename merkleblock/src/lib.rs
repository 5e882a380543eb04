//! Merkle blocks for light clients.
//!
//! A [`MerkleBlock`] pairs a block header with a [`PartialMerkleTree`] over the block's
//! transactions. A full node builds one from a block and the light client's bloom filter; the
//! light client checks it against the header it already has and learns which of its transactions
//! the block contains, without downloading the block.
//!
//! ```no_run
//! # use merkleblock::{BlockHeader, MerkleBlock, Sha256dHasher};
//! # fn example<Hd: BlockHeader>(bytes: &[u8]) -> anyhow::Result<()> {
//! let merkle_block = MerkleBlock::<Hd>::from_bytes(bytes)?;
//! for matched in merkle_block.verify::<Sha256dHasher>()? {
//!     println!("transaction {} at position {}", hex::encode(matched.txid), matched.index);
//! }
//! # Ok(())
//! # }
//! ```

pub use merkleblock_core::{
    bits, hasher, tree, wire, BuildError, DecodeError, ExtractedProof, Hash, MatchedTransaction,
    MerkleHasher, MerkleTree, Options, PartialMerkleTree, ProofError, EMPTY_ROOT, MAX_LEAF_COUNT,
};

#[cfg(feature = "blake3-hasher")]
pub use merkleblock_core::hasher::Blake3Hasher;
#[cfg(feature = "sha2-hasher")]
pub use merkleblock_core::hasher::{Sha256dHasher, Sha2Hasher};

pub use collab::{Block, BlockHeader, BloomFilter, Transaction};
pub use merkle_block::MerkleBlock;

mod collab;
mod merkle_block;
