//! The block-chain types a merkle block is built from.
//!
//! Headers, transactions, blocks and bloom filters belong to the surrounding protocol. This crate
//! only needs the few operations below from them.

use merkleblock_core::Hash;

/// A block header.
pub trait BlockHeader: Sized {
    /// The identifying hash of the block.
    fn block_hash(&self) -> Hash;

    /// The merkle root of the block's transactions, as committed to by the header.
    fn merkle_root(&self) -> Hash;

    /// Append the header's serialized form to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a header from the front of `input`, advancing it past the header.
    fn decode(input: &mut &[u8]) -> anyhow::Result<Self>;
}

/// A transaction.
pub trait Transaction {
    /// The identifying hash of the transaction. These are the leaves of the block's merkle tree.
    fn txid(&self) -> Hash;
}

/// A full block.
pub trait Block {
    /// The header type.
    type Header: BlockHeader;
    /// The transaction type.
    type Transaction: Transaction;

    /// The block header.
    fn header(&self) -> &Self::Header;

    /// The transactions of the block, in block order.
    fn transactions(&self) -> &[Self::Transaction];
}

/// A filter selecting the transactions a light client is interested in.
pub trait BloomFilter<T: ?Sized> {
    /// Whether `tx` is relevant.
    ///
    /// The filter may update itself as a side effect, e.g. to start matching transactions which
    /// spend outputs of `tx`. Transactions are offered in block order, each exactly once.
    fn is_relevant_and_update(&mut self, tx: &T) -> bool;
}

impl<T: ?Sized, F: FnMut(&T) -> bool> BloomFilter<T> for F {
    fn is_relevant_and_update(&mut self, tx: &T) -> bool {
        self(tx)
    }
}
