//! Core types and operations for partial merkle tree proofs.
//!
//! A partial merkle tree proves that a subset of the transactions of a block is included in the
//! block's merkle root, without carrying the full transaction list. This crate builds such proofs
//! from a list of transaction identifiers and match flags, encodes and decodes them, recovers the
//! matched identifiers and the root from them, and trims them down to fewer matches.
//!
//! The types and verification routines of this crate do not require the standard library, but
//! do require Rust's alloc crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod bits;
pub mod hasher;
pub mod partial_tree;
pub mod tree;
pub mod wire;

mod options;

pub use hasher::MerkleHasher;
pub use options::Options;
pub use partial_tree::{
    BuildError, ExtractedProof, MatchedTransaction, PartialMerkleTree, ProofError,
};
pub use tree::{Hash, MerkleTree, EMPTY_ROOT, MAX_LEAF_COUNT};
pub use wire::DecodeError;
