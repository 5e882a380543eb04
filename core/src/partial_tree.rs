//! Partial merkle trees: compact proofs that some transactions are included in a block.
//!
//! A proof is built from the full list of transaction identifiers of a block and a flag per
//! transaction telling whether it matched. Every leaf that matched is marked together with the
//! path from it to the root. The tree is then walked depth-first, pre-order, left before right,
//! descending only into marked nodes. Each visited node contributes one flag bit (whether it is
//! marked), and each visited node that is either a leaf or unmarked contributes its hash.
//!
//! A verifier rebuilds the shape of the tree from the declared transaction count alone and
//! replays the same walk, pulling a flag bit for each node and a hash for each leaf or unmarked
//! node. Hashing the replayed nodes back up yields the root, which is compared against the root
//! in the block header. The leaves reached through marked nodes are the matched transactions.
//!
//! ## Example
//!
//! For four transactions `a, b, c, d` with only `c` matched, the walk visits:
//!
//! ```text
//!            root (1)
//!          /        \
//!       ab (0)     cd (1)
//!                 /     \
//!               c (1)   d (0)
//! ```
//!
//! giving flags `1 0 1 1 0` and hashes `[ab, c, d]`.

use crate::{
    bits::{BitReader, BitWriter, FlagBits},
    hasher::MerkleHasher,
    options::Options,
    tree::{Hash, Marks, MerkleTree, NodeIndex, TreeError},
};

use alloc::{collections::BTreeSet, vec::Vec};
use bitvec::prelude::*;
use core::{fmt, slice};

/// A transaction found in a partial merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedTransaction {
    /// The position of the transaction within its block.
    pub index: u32,
    /// The identifier of the transaction.
    pub txid: Hash,
}

/// Errors in building a partial merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// A different number of match flags than leaves was provided.
    MatchCountMismatch {
        /// The number of leaves.
        leaves: usize,
        /// The number of match flags.
        matches: usize,
    },
    /// The number of leaves exceeds [`crate::MAX_LEAF_COUNT`].
    TooManyLeaves(usize),
}

impl From<TreeError> for BuildError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::TooManyLeaves(count) => BuildError::TooManyLeaves(count),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MatchCountMismatch { leaves, matches } => write!(
                f,
                "{} match flags provided for {} leaves",
                matches, leaves
            ),
            BuildError::TooManyLeaves(count) => {
                write!(f, "{} leaves exceed the leaf count limit", count)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BuildError {}

/// Errors in parsing or verifying a partial merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    /// The declared transaction count exceeds the configured limit.
    TooManyLeaves(u32),
    /// More hashes were provided than the tree has leaves.
    TooManyHashes,
    /// Fewer flag bits were provided than hashes.
    NotEnoughFlags,
    /// The flag bits ran out before the walk finished.
    FlagsExhausted,
    /// The hashes ran out before the walk finished.
    HashesExhausted,
    /// Hashes remained after the walk finished.
    UnusedHashes,
    /// Whole flag bytes remained after the walk finished.
    UnusedFlags,
    /// The empty tree was flagged as containing a match.
    EmptyTreeMatch,
    /// Two sibling subtrees hash equal. Only reported when
    /// [`Options::reject_duplicate_subtrees`] is set.
    DuplicateSubtree,
}

impl fmt::Display for ProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofError::TooManyLeaves(count) => {
                write!(f, "declared transaction count {} exceeds the limit", count)
            }
            ProofError::TooManyHashes => f.write_str("more hashes than transactions"),
            ProofError::NotEnoughFlags => f.write_str("fewer flag bits than hashes"),
            ProofError::FlagsExhausted => f.write_str("flag bits exhausted"),
            ProofError::HashesExhausted => f.write_str("hashes exhausted"),
            ProofError::UnusedHashes => f.write_str("not all hashes were consumed"),
            ProofError::UnusedFlags => f.write_str("not all flag bytes were consumed"),
            ProofError::EmptyTreeMatch => f.write_str("match flagged in an empty tree"),
            ProofError::DuplicateSubtree => f.write_str("sibling subtrees hash equal"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProofError {}

/// A partial merkle tree: the transaction count of a block, the hashes of its pruned subtrees
/// and matched leaves, and the flag bits describing the walk.
///
/// The flag bits are padded with zeros to a whole number of bytes, as they are on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct PartialMerkleTree {
    transaction_count: u32,
    hashes: Vec<Hash>,
    flags: FlagBits,
}

impl fmt::Debug for PartialMerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialMerkleTree")
            .field("transaction_count", &self.transaction_count)
            .field(
                "hashes",
                &self.hashes.iter().map(hex::encode).collect::<Vec<_>>(),
            )
            .field("flags", &hex::encode(self.flag_bytes()))
            .finish()
    }
}

impl PartialMerkleTree {
    /// Build a proof for the leaves whose entry in `matches` is `true`.
    pub fn build_from_matches<H: MerkleHasher>(
        leaves: &[Hash],
        matches: &[bool],
    ) -> Result<Self, BuildError> {
        if leaves.len() != matches.len() {
            return Err(BuildError::MatchCountMismatch {
                leaves: leaves.len(),
                matches: matches.len(),
            });
        }

        let tree = MerkleTree::build::<H>(leaves)?;
        let mut marks = Marks::new(&tree);
        for (leaf, _) in tree.leaves().zip(matches).filter(|(_, matched)| **matched) {
            marks.mark_path(&tree, leaf);
        }

        let proof = Self::from_marked_tree(&tree, &marks);
        tracing::trace!(
            transactions = leaves.len(),
            hashes = proof.hashes.len(),
            flag_bytes = proof.flag_bytes().len(),
            "built partial merkle tree"
        );
        Ok(proof)
    }

    /// Assemble a proof from its raw parts, as read from the wire. Nothing is checked until the
    /// proof is extracted.
    pub fn from_parts(transaction_count: u32, hashes: Vec<Hash>, flag_bytes: Vec<u8>) -> Self {
        PartialMerkleTree {
            transaction_count,
            hashes,
            flags: FlagBits::from_vec(flag_bytes),
        }
    }

    // walk the tree from the root, emitting flags and hashes for the marked paths.
    fn from_marked_tree(tree: &MerkleTree, marks: &Marks) -> Self {
        let mut flags = BitWriter::new();
        let mut hashes = Vec::new();
        write_subtree(tree, marks, tree.root(), &mut flags, &mut hashes);

        let mut flags = flags.into_bits();
        let padded_len = (flags.len() + 7) / 8 * 8;
        flags.resize(padded_len, false);

        PartialMerkleTree {
            transaction_count: tree.leaf_count(),
            hashes,
            flags,
        }
    }

    /// The number of transactions in the block this proof is about.
    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    /// The hashes of pruned subtrees and matched leaves, in walk order.
    pub fn hashes(&self) -> &[Hash] {
        &self.hashes
    }

    /// The flag bits, in walk order, including the zero padding of the final byte.
    pub fn flags(&self) -> &BitSlice<u8, Lsb0> {
        &self.flags
    }

    /// The flag bits packed into bytes.
    pub fn flag_bytes(&self) -> &[u8] {
        self.flags.as_raw_slice()
    }

    /// Replay the proof with the default [`Options`], yielding the matched transactions and the
    /// root.
    pub fn extract<H: MerkleHasher>(&self) -> Result<ExtractedProof, ProofError> {
        self.extract_with::<H>(&Options::default())
    }

    /// Replay the proof, yielding the matched transactions and the root.
    pub fn extract_with<H: MerkleHasher>(
        &self,
        options: &Options,
    ) -> Result<ExtractedProof, ProofError> {
        let count = self.transaction_count;
        if count > options.max_leaf_count {
            return Err(ProofError::TooManyLeaves(count));
        }
        // even the empty tree carries one hash.
        if self.hashes.len() > core::cmp::max(count as usize, 1) {
            return Err(ProofError::TooManyHashes);
        }
        if self.flags.len() < self.hashes.len() {
            return Err(ProofError::NotEnoughFlags);
        }

        let tree = MerkleTree::build_empty_shape(count)
            .map_err(|TreeError::TooManyLeaves(_)| ProofError::TooManyLeaves(count))?;
        let root = tree.root();
        let mut replay = Replay {
            tree,
            flags: BitReader::from_bits(&self.flags),
            hashes: self.hashes.iter(),
            matches: Vec::new(),
            options,
        };
        let root_hash = replay.visit::<H>(root)?;

        if replay.hashes.len() != 0 {
            return Err(ProofError::UnusedHashes);
        }
        let used_bytes = (replay.flags.position() + 7) / 8;
        if used_bytes != self.flag_bytes().len() {
            return Err(ProofError::UnusedFlags);
        }

        tracing::trace!(
            transactions = count,
            matches = replay.matches.len(),
            root = %hex::encode(root_hash),
            "extracted partial merkle tree"
        );
        Ok(ExtractedProof {
            root: root_hash,
            matches: replay.matches,
            tree: replay.tree,
        })
    }

    /// The matched transactions, in block order.
    pub fn extract_matches<H: MerkleHasher>(&self) -> Result<Vec<MatchedTransaction>, ProofError> {
        self.extract::<H>().map(ExtractedProof::into_matches)
    }

    /// The merkle root the proof hashes up to.
    pub fn recompute_root<H: MerkleHasher>(&self) -> Result<Hash, ProofError> {
        self.extract::<H>().map(|extracted| extracted.root)
    }

    /// Whether the proof is well-formed and, if `expected_root` is given, hashes up to it.
    ///
    /// Never fails: the reason for a rejection is logged at debug level and discarded.
    pub fn check<H: MerkleHasher>(&self, expected_root: Option<&Hash>) -> bool {
        self.check_with::<H>(&Options::default(), expected_root)
    }

    /// [`PartialMerkleTree::check`] with the given options.
    pub fn check_with<H: MerkleHasher>(
        &self,
        options: &Options,
        expected_root: Option<&Hash>,
    ) -> bool {
        let extracted = match self.extract_with::<H>(options) {
            Ok(extracted) => extracted,
            Err(error) => {
                tracing::debug!(%error, "rejected partial merkle tree");
                return false;
            }
        };

        match expected_root {
            Some(expected) if expected != &extracted.root => {
                tracing::debug!(
                    expected = %hex::encode(expected),
                    computed = %hex::encode(extracted.root),
                    "partial merkle tree root mismatch"
                );
                false
            }
            _ => true,
        }
    }

    /// Shrink the proof so that it only proves the matched transactions whose identifier is in
    /// `keep`. The transaction count and root are unchanged.
    ///
    /// Identifiers in `keep` which the proof does not match are ignored: a pruned subtree cannot
    /// be re-expanded.
    pub fn trim<H: MerkleHasher>(&self, keep: &[Hash]) -> Result<Self, ProofError> {
        let extracted = self.extract::<H>()?;
        let keep: BTreeSet<&Hash> = keep.iter().collect();

        let mut marks = Marks::new(&extracted.tree);
        for matched in extracted.matches.iter().filter(|m| keep.contains(&m.txid)) {
            marks.mark_path(&extracted.tree, matched.index as NodeIndex);
        }

        Ok(Self::from_marked_tree(&extracted.tree, &marks))
    }
}

fn write_subtree(
    tree: &MerkleTree,
    marks: &Marks,
    index: NodeIndex,
    flags: &mut BitWriter,
    hashes: &mut Vec<Hash>,
) {
    let marked = marks.is_marked(index);
    flags.write_bit(marked);

    let node = tree.node(index);
    match node.left() {
        Some(left) if marked => {
            write_subtree(tree, marks, left, flags, hashes);
            if let Some(right) = node.right() {
                write_subtree(tree, marks, right, flags, hashes);
            }
        }
        _ => {
            // UNWRAP: built trees have every hash. Replayed trees have the hash of every node
            // reached by the replay, and the marks of a trimmed tree never reach further.
            hashes.push(*node.hash().unwrap());
        }
    }
}

/// The outcome of replaying a [`PartialMerkleTree`].
#[derive(Debug, Clone)]
pub struct ExtractedProof {
    root: Hash,
    matches: Vec<MatchedTransaction>,
    tree: MerkleTree,
}

impl ExtractedProof {
    /// The merkle root the proof hashes up to.
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// The matched transactions, in block order.
    pub fn matches(&self) -> &[MatchedTransaction] {
        &self.matches
    }

    /// Take the matched transactions.
    pub fn into_matches(self) -> Vec<MatchedTransaction> {
        self.matches
    }

    /// The replayed tree. Only nodes reached by the walk have a hash.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }
}

// the state of a single replay: the tree being filled in and cursors into the proof.
struct Replay<'a> {
    tree: MerkleTree,
    flags: BitReader<'a>,
    hashes: slice::Iter<'a, Hash>,
    matches: Vec<MatchedTransaction>,
    options: &'a Options,
}

impl<'a> Replay<'a> {
    // returns the hash of the visited node.
    fn visit<H: MerkleHasher>(&mut self, index: NodeIndex) -> Result<Hash, ProofError> {
        let marked = self
            .flags
            .read_bit()
            .map_err(|_| ProofError::FlagsExhausted)?;

        let node = self.tree.node(index);
        let (left, right) = match node.left() {
            Some(left) if marked => (left, node.right()),
            _ => {
                let hash = *self.hashes.next().ok_or(ProofError::HashesExhausted)?;
                if marked {
                    if self.tree.leaf_count() == 0 {
                        return Err(ProofError::EmptyTreeMatch);
                    }
                    self.matches.push(MatchedTransaction {
                        index: index as u32,
                        txid: hash,
                    });
                }
                self.tree.set_hash(index, hash);
                return Ok(hash);
            }
        };

        let left_hash = self.visit::<H>(left)?;
        let right_hash = match right {
            Some(right) => {
                let right_hash = self.visit::<H>(right)?;
                if self.options.reject_duplicate_subtrees && right_hash == left_hash {
                    return Err(ProofError::DuplicateSubtree);
                }
                right_hash
            }
            None => left_hash,
        };

        let hash = H::hash_pair(&left_hash, &right_hash);
        self.tree.set_hash(index, hash);
        Ok(hash)
    }
}
