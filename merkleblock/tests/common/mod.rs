#![allow(dead_code)]

use anyhow::ensure;
use merkleblock::{Block, BlockHeader, Hash, MerkleTree, Sha256dHasher, Transaction};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const ENV_NAME: &str = "MERKLEBLOCK_TEST_LOG";

/// Install a test-writer subscriber filtered by `MERKLEBLOCK_TEST_LOG`. Safe to call from every
/// test.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var(ENV_NAME)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn sha256d(data: &[u8]) -> Hash {
    Sha256::digest(Sha256::digest(data)).into()
}

/// An 80-byte header laid out like the protocol's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub prev_block: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader for Header {
    fn block_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(80);
        self.encode(&mut buf);
        sha256d(&buf)
    }

    fn merkle_root(&self) -> Hash {
        self.merkle_root
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.prev_block);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }

    fn decode(input: &mut &[u8]) -> anyhow::Result<Self> {
        ensure!(input.len() >= 80, "header needs 80 bytes, got {}", input.len());
        let (bytes, rest) = input.split_at(80);
        *input = rest;

        let u32_at =
            |offset: usize| u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let hash_at = |offset: usize| -> Hash { bytes[offset..offset + 32].try_into().unwrap() };
        Ok(Header {
            version: u32_at(0),
            prev_block: hash_at(4),
            merkle_root: hash_at(36),
            time: u32_at(68),
            bits: u32_at(72),
            nonce: u32_at(76),
        })
    }
}

/// A transaction reduced to its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub payload: Vec<u8>,
}

impl Transaction for Tx {
    fn txid(&self) -> Hash {
        sha256d(&self.payload)
    }
}

pub struct TestBlock {
    pub header: Header,
    pub transactions: Vec<Tx>,
}

impl Block for TestBlock {
    type Header = Header;
    type Transaction = Tx;

    fn header(&self) -> &Header {
        &self.header
    }

    fn transactions(&self) -> &[Tx] {
        &self.transactions
    }
}

impl TestBlock {
    /// A block of `n` transactions with payloads `tx-0`, `tx-1`, ... and a correct merkle root.
    pub fn new(n: usize) -> Self {
        let transactions = (0..n)
            .map(|i| Tx {
                payload: format!("tx-{}", i).into_bytes(),
            })
            .collect();
        Self::with_transactions(transactions)
    }

    pub fn with_transactions(transactions: Vec<Tx>) -> Self {
        let txids: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
        let merkle_root = MerkleTree::build::<Sha256dHasher>(&txids)
            .unwrap()
            .root_hash()
            .unwrap();
        TestBlock {
            header: Header {
                version: 4,
                prev_block: [0x11; 32],
                merkle_root,
                time: 1_700_000_000,
                bits: 0x1d00ffff,
                nonce: 42,
            },
            transactions,
        }
    }

    pub fn txids(&self) -> Vec<Hash> {
        self.transactions.iter().map(Transaction::txid).collect()
    }
}

/// A stand-in for a bloom filter: an exact set of byte strings. A transaction is relevant when
/// its payload contains any element. Relevant transactions have their txid added, so that later
/// transactions referring to them match too.
#[derive(Debug, Default)]
pub struct ElementFilter {
    pub elements: HashSet<Vec<u8>>,
    pub observed: Vec<Hash>,
}

impl ElementFilter {
    pub fn new(elements: &[&[u8]]) -> Self {
        ElementFilter {
            elements: elements.iter().map(|e| e.to_vec()).collect(),
            observed: Vec::new(),
        }
    }
}

impl merkleblock::BloomFilter<Tx> for ElementFilter {
    fn is_relevant_and_update(&mut self, tx: &Tx) -> bool {
        let txid = tx.txid();
        self.observed.push(txid);

        let relevant = self
            .elements
            .iter()
            .any(|e| !e.is_empty() && tx.payload.windows(e.len()).any(|w| w == &e[..]));
        if relevant {
            self.elements.insert(txid.to_vec());
        }
        relevant
    }
}
