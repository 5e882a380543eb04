use crate::tree::MAX_LEAF_COUNT;

/// Options when parsing a [`crate::PartialMerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// The largest transaction count a proof may declare.
    pub(crate) max_leaf_count: u32,
    /// Whether to reject proofs in which two sibling subtrees hash equal.
    pub(crate) reject_duplicate_subtrees: bool,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            max_leaf_count: MAX_LEAF_COUNT,
            reject_duplicate_subtrees: false,
        }
    }

    /// Set the largest transaction count a proof may declare.
    ///
    /// Values over [`MAX_LEAF_COUNT`] will be rounded down to [`MAX_LEAF_COUNT`].
    ///
    /// Default: [`MAX_LEAF_COUNT`].
    pub fn max_leaf_count(&mut self, max_leaf_count: u32) {
        self.max_leaf_count = core::cmp::min(max_leaf_count, MAX_LEAF_COUNT);
    }

    /// Reject proofs in which an internal node has two distinct children with equal hashes.
    ///
    /// A block whose transaction list ends with a repeated run hashes to the same root as the
    /// block without the repetition, so two different transaction sets can share a proof. This
    /// check refuses the repeated form. It does not change the wire format, but it does refuse
    /// some proofs other implementations accept.
    ///
    /// Default: off.
    pub fn reject_duplicate_subtrees(&mut self, reject: bool) {
        self.reject_duplicate_subtrees = reject;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
