//! Merkle blocks: a block header paired with a partial merkle tree over its transactions.

use anyhow::{bail, Context as _};
use merkleblock_core::{
    BuildError, Hash, MatchedTransaction, MerkleHasher, Options, PartialMerkleTree,
};
use std::collections::HashSet;

use crate::collab::{Block, BlockHeader, BloomFilter, Transaction};

/// A block header and a proof that some of the block's transactions are included in it.
///
/// Serialized as the header followed by the partial merkle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock<Hd> {
    header: Hd,
    txn: PartialMerkleTree,
}

impl<Hd: BlockHeader> MerkleBlock<Hd> {
    /// Pair a header with an existing proof. The proof is not checked against the header.
    pub fn new(header: Hd, txn: PartialMerkleTree) -> Self {
        MerkleBlock { header, txn }
    }

    /// Build a merkle block proving every transaction identifier for which `predicate` holds.
    pub fn from_match_predicate<H: MerkleHasher>(
        header: Hd,
        txids: &[Hash],
        mut predicate: impl FnMut(&Hash) -> bool,
    ) -> Result<Self, BuildError> {
        let matches: Vec<bool> = txids.iter().map(|txid| predicate(txid)).collect();
        let txn = PartialMerkleTree::build_from_matches::<H>(txids, &matches)?;
        Ok(Self::assemble(header, txn, &matches))
    }

    /// Build a merkle block proving every transaction the filter finds relevant.
    ///
    /// The filter is queried once per transaction, in order.
    pub fn from_bloom_filter<H: MerkleHasher, T: Transaction>(
        header: Hd,
        transactions: &[T],
        filter: &mut impl BloomFilter<T>,
    ) -> Result<Self, BuildError> {
        let (txids, matches): (Vec<Hash>, Vec<bool>) = transactions
            .iter()
            .map(|tx| (tx.txid(), filter.is_relevant_and_update(tx)))
            .unzip();

        let txn = PartialMerkleTree::build_from_matches::<H>(&txids, &matches)?;
        Ok(Self::assemble(header, txn, &matches))
    }

    fn assemble(header: Hd, txn: PartialMerkleTree, matches: &[bool]) -> Self {
        tracing::debug!(
            block = %hex::encode(header.block_hash()),
            transactions = matches.len(),
            matched = matches.iter().filter(|m| **m).count(),
            "built merkle block"
        );
        MerkleBlock { header, txn }
    }

    /// The block header.
    pub fn header(&self) -> &Hd {
        &self.header
    }

    /// The partial merkle tree.
    pub fn txn(&self) -> &PartialMerkleTree {
        &self.txn
    }

    /// Split into the header and the partial merkle tree.
    pub fn into_parts(self) -> (Hd, PartialMerkleTree) {
        (self.header, self.txn)
    }

    /// Check the proof against the merkle root in the header, yielding the proven transactions.
    pub fn verify<H: MerkleHasher>(&self) -> anyhow::Result<Vec<MatchedTransaction>> {
        self.verify_with::<H>(&Options::default())
    }

    /// [`MerkleBlock::verify`] with the given options.
    pub fn verify_with<H: MerkleHasher>(
        &self,
        options: &Options,
    ) -> anyhow::Result<Vec<MatchedTransaction>> {
        let block = hex::encode(self.header.block_hash());
        let extracted = self
            .txn
            .extract_with::<H>(options)
            .with_context(|| format!("invalid partial merkle tree in block {}", block))?;

        let expected = self.header.merkle_root();
        if extracted.root() != &expected {
            bail!(
                "merkle root mismatch in block {}: header commits to {}, proof hashes to {}",
                block,
                hex::encode(expected),
                hex::encode(extracted.root()),
            );
        }

        Ok(extracted.into_matches())
    }

    /// Whether the proof is valid against the merkle root in the header. Never fails.
    pub fn check<H: MerkleHasher>(&self) -> bool {
        self.txn.check::<H>(Some(&self.header.merkle_root()))
    }

    /// Append the serialized form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        self.txn.encode(out);
    }

    /// The serialized form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Decode a merkle block from the front of `input`, advancing it past the merkle block.
    pub fn decode(input: &mut &[u8]) -> anyhow::Result<Self> {
        let header = Hd::decode(input).context("decoding merkle block header")?;
        let txn = PartialMerkleTree::decode(input).context("decoding partial merkle tree")?;
        Ok(MerkleBlock { header, txn })
    }

    /// Decode a merkle block which must span all of `bytes`.
    pub fn from_bytes(mut bytes: &[u8]) -> anyhow::Result<Self> {
        let merkle_block = Self::decode(&mut bytes)?;
        if !bytes.is_empty() {
            bail!("{} trailing bytes after merkle block", bytes.len());
        }
        Ok(merkle_block)
    }
}

impl<Hd: BlockHeader + Clone> MerkleBlock<Hd> {
    /// Build a merkle block for a full block, proving every transaction the filter finds
    /// relevant.
    pub fn from_block<H: MerkleHasher, B>(
        block: &B,
        filter: &mut impl BloomFilter<B::Transaction>,
    ) -> Result<Self, BuildError>
    where
        B: Block<Header = Hd>,
    {
        Self::from_bloom_filter::<H, _>(block.header().clone(), block.transactions(), filter)
    }

    /// Build a merkle block for a full block, proving the transactions with the given
    /// identifiers. Identifiers not in the block are ignored.
    pub fn from_txids<H: MerkleHasher, B>(block: &B, txids: &[Hash]) -> Result<Self, BuildError>
    where
        B: Block<Header = Hd>,
    {
        let wanted: HashSet<&Hash> = txids.iter().collect();
        let leaves: Vec<Hash> = block.transactions().iter().map(|tx| tx.txid()).collect();
        Self::from_match_predicate::<H>(block.header().clone(), &leaves, |txid| {
            wanted.contains(txid)
        })
    }
}
