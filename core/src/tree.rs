//! This module defines the binary hash tree built over the transaction identifiers of a block.
//!
//! The tree is built bottom-up, one row at a time. Adjacent nodes of a row (0 with 1, 2 with 3,
//! ...) become the two children of a node in the row above. When a row has odd length its last
//! node becomes the only child of its parent, and the parent hashes that child against itself.
//! Building stops at the row with a single node: the root.
//!
//! A tree over zero leaves is a single leaf holding [`EMPTY_ROOT`]. A tree over one leaf is that
//! leaf alone; its root hash is the leaf hash.
//!
//! Nodes are stored in an arena and refer to each other by [`NodeIndex`]. Leaves occupy the
//! lowest indices in left-to-right order and every node is stored after both of its children,
//! so the root is always the last node.

use crate::hasher::MerkleHasher;
use alloc::vec::Vec;
use bitvec::prelude::*;
use core::{fmt, ops::Range};

/// A 256-bit hash. Used for transaction identifiers, tree nodes and merkle roots alike.
pub type Hash = [u8; 32];

/// The root hash of a tree with no leaves.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// The largest number of leaves a tree may be built over.
///
/// Proofs declare their leaf count before any hash in them can be checked, so this caps the
/// allocation an untrusted proof can cause.
pub const MAX_LEAF_COUNT: u32 = 1 << 20;

/// The position of a node within a [`MerkleTree`].
pub type NodeIndex = usize;

/// Errors in building a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The leaf count exceeds [`MAX_LEAF_COUNT`].
    TooManyLeaves(usize),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::TooManyLeaves(count) => write!(
                f,
                "tree of {} leaves exceeds the limit of {}",
                count, MAX_LEAF_COUNT
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TreeError {}

/// A single node of a [`MerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    hash: Option<Hash>,
    parent: Option<NodeIndex>,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
}

impl TreeNode {
    fn new(left: Option<NodeIndex>, right: Option<NodeIndex>) -> Self {
        TreeNode {
            hash: None,
            parent: None,
            left,
            right,
        }
    }

    /// The hash of the node, if known.
    pub fn hash(&self) -> Option<&Hash> {
        self.hash.as_ref()
    }

    /// Whether this is a leaf, i.e. it has no children.
    pub fn is_leaf(&self) -> bool {
        self.left.is_none()
    }

    /// The parent of the node. `None` at the root.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// The left child. Every internal node has one.
    pub fn left(&self) -> Option<NodeIndex> {
        self.left
    }

    /// The right child. `None` for leaves and for the last node of an odd row's parent row.
    pub fn right(&self) -> Option<NodeIndex> {
        self.right
    }
}

/// A full binary hash tree over an ordered sequence of leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    nodes: Vec<TreeNode>,
    leaf_count: u32,
}

impl MerkleTree {
    /// Build the tree over `leaves`, computing every node hash.
    pub fn build<H: MerkleHasher>(leaves: &[Hash]) -> Result<Self, TreeError> {
        let count = u32::try_from(leaves.len())
            .ok()
            .filter(|c| *c <= MAX_LEAF_COUNT)
            .ok_or(TreeError::TooManyLeaves(leaves.len()))?;

        let mut tree = Self::build_empty_shape(count)?;
        if leaves.is_empty() {
            tree.nodes[0].hash = Some(EMPTY_ROOT);
            return Ok(tree);
        }

        for (node, leaf) in tree.nodes.iter_mut().zip(leaves) {
            node.hash = Some(*leaf);
        }
        // children are always stored before their parent.
        for index in leaves.len()..tree.nodes.len() {
            tree.recompute_hash::<H>(index);
        }
        Ok(tree)
    }

    /// Build the shape [`MerkleTree::build`] would produce for `leaf_count` leaves, with every
    /// hash unknown.
    pub fn build_empty_shape(leaf_count: u32) -> Result<Self, TreeError> {
        if leaf_count > MAX_LEAF_COUNT {
            return Err(TreeError::TooManyLeaves(leaf_count as usize));
        }

        let leaf_nodes = core::cmp::max(leaf_count as usize, 1);
        let mut nodes = Vec::with_capacity(leaf_nodes * 2);
        nodes.extend((0..leaf_nodes).map(|_| TreeNode::new(None, None)));

        let mut row = 0..leaf_nodes;
        while row.len() > 1 {
            let next_start = nodes.len();
            for left in row.clone().step_by(2) {
                let right = Some(left + 1).filter(|r| row.contains(r));
                let parent = nodes.len();
                nodes[left].parent = Some(parent);
                if let Some(right) = right {
                    nodes[right].parent = Some(parent);
                }
                nodes.push(TreeNode::new(Some(left), right));
            }
            row = next_start..nodes.len();
        }

        Ok(MerkleTree { nodes, leaf_count })
    }

    /// The number of leaves the tree was built for. Zero for the empty tree, even though it holds
    /// a single sentinel node.
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// The number of levels above the leaves.
    pub fn height(&self) -> u32 {
        tree_height(self.leaf_count)
    }

    /// The total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The root node.
    pub fn root(&self) -> NodeIndex {
        self.nodes.len() - 1
    }

    /// The hash of the root, if known.
    pub fn root_hash(&self) -> Option<Hash> {
        self.nodes[self.root()].hash
    }

    /// Get the node at `index`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index]
    }

    /// Get the hash of the node at `index`, if known.
    pub fn hash(&self, index: NodeIndex) -> Option<&Hash> {
        self.nodes[index].hash.as_ref()
    }

    pub(crate) fn set_hash(&mut self, index: NodeIndex, hash: Hash) {
        self.nodes[index].hash = Some(hash);
    }

    /// All leaves, left to right.
    pub fn leaves(&self) -> Range<NodeIndex> {
        0..core::cmp::max(self.leaf_count as usize, 1)
    }

    /// The subtree rooted at `index` in post-order: every child comes before its parent and the
    /// node itself comes last.
    pub fn descendants(&self, index: NodeIndex) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: alloc::vec![(index, false)],
        }
    }

    /// The ancestors of `index`, from its parent up to the root.
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes[index].parent,
        }
    }

    /// Recompute the hash of an internal node from its children. A node with no right child
    /// hashes its left child against itself.
    ///
    /// Leaves, and nodes missing a child hash, keep their current hash.
    pub fn recompute_hash<H: MerkleHasher>(&mut self, index: NodeIndex) {
        let node = &self.nodes[index];
        let Some(left) = node.left else { return };
        let right = node.right.unwrap_or(left);

        if let (Some(left), Some(right)) = (self.nodes[left].hash, self.nodes[right].hash) {
            self.nodes[index].hash = Some(H::hash_pair(&left, &right));
        }
    }
}

/// Iterator over a subtree in post-order. See [`MerkleTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a MerkleTree,
    // (node, children already pushed)
    stack: Vec<(NodeIndex, bool)>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        loop {
            let (index, expanded) = self.stack.pop()?;
            let node = &self.tree.nodes[index];
            if expanded || node.is_leaf() {
                return Some(index);
            }

            self.stack.push((index, true));
            if let Some(right) = node.right {
                self.stack.push((right, false));
            }
            if let Some(left) = node.left {
                self.stack.push((left, false));
            }
        }
    }
}

/// Iterator over the ancestors of a node. See [`MerkleTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a MerkleTree,
    next: Option<NodeIndex>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let index = self.next?;
        self.next = self.tree.nodes[index].parent;
        Some(index)
    }
}

/// The set of marked nodes of one tree, kept apart from the tree itself.
///
/// A node is marked when at least one leaf beneath it is marked.
#[derive(Debug, Clone)]
pub struct Marks {
    bits: BitVec,
}

impl Marks {
    /// No node of `tree` marked.
    pub fn new(tree: &MerkleTree) -> Self {
        Marks {
            bits: bitvec![0; tree.len()],
        }
    }

    /// Mark `leaf` and all of its ancestors.
    pub fn mark_path(&mut self, tree: &MerkleTree, leaf: NodeIndex) {
        self.bits.set(leaf, true);
        for ancestor in tree.ancestors(leaf) {
            if self.bits[ancestor] {
                // everything above is marked already.
                break;
            }
            self.bits.set(ancestor, true);
        }
    }

    /// Whether the node at `index` is marked.
    pub fn is_marked(&self, index: NodeIndex) -> bool {
        self.bits[index]
    }
}

/// The number of nodes at `height` (leaves are height 0) of a tree over `leaf_count` leaves.
pub fn tree_width(leaf_count: u32, height: u32) -> u32 {
    ((leaf_count as u64 + (1u64 << height) - 1) >> height) as u32
}

/// The height of the root of a tree over `leaf_count` leaves.
pub fn tree_height(leaf_count: u32) -> u32 {
    let mut height = 0;
    while tree_width(leaf_count, height) > 1 {
        height += 1;
    }
    height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{MerkleHasher, Sha256dHasher};

    fn leaf(n: u8) -> Hash {
        [n; 32]
    }

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn empty_tree_is_the_zero_sentinel() {
        let tree = MerkleTree::build::<Sha256dHasher>(&[]).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.root_hash(), Some(EMPTY_ROOT));
        assert!(tree.node(tree.root()).is_leaf());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let tree = MerkleTree::build::<Sha256dHasher>(&[leaf(7)]).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root_hash(), Some(leaf(7)));
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn odd_row_duplicates_last_node() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let tree = MerkleTree::build::<Sha256dHasher>(&[a, b, c]).unwrap();

        let ab = Sha256dHasher::hash_pair(&a, &b);
        let cc = Sha256dHasher::hash_pair(&c, &c);
        assert_eq!(tree.root_hash(), Some(Sha256dHasher::hash_pair(&ab, &cc)));

        // a, b, c, ab, c_, root
        assert_eq!(tree.len(), 6);
        let lone_parent = tree.node(2).parent().unwrap();
        assert_eq!(tree.node(lone_parent).left(), Some(2));
        assert_eq!(tree.node(lone_parent).right(), None);
    }

    #[test]
    fn empty_shape_matches_built_shape() {
        for n in 0..40u8 {
            let built = MerkleTree::build::<Sha256dHasher>(&leaves(n)).unwrap();
            let shape = MerkleTree::build_empty_shape(n as u32).unwrap();
            assert_eq!(built.len(), shape.len());
            assert_eq!(built.height(), shape.height());
            assert!(shape.nodes.iter().all(|node| node.hash().is_none()));
            for index in 0..built.len() {
                let (b, s) = (built.node(index), shape.node(index));
                assert_eq!(
                    (b.parent(), b.left(), b.right()),
                    (s.parent(), s.left(), s.right())
                );
            }
        }
    }

    #[test]
    fn leaf_count_ceiling() {
        assert_eq!(
            MerkleTree::build_empty_shape(MAX_LEAF_COUNT + 1),
            Err(TreeError::TooManyLeaves(MAX_LEAF_COUNT as usize + 1))
        );
    }

    #[test]
    fn widths_and_heights() {
        assert_eq!(tree_height(0), 0);
        assert_eq!(tree_height(1), 0);
        assert_eq!(tree_height(2), 1);
        assert_eq!(tree_height(3), 2);
        assert_eq!(tree_height(MAX_LEAF_COUNT), 20);
        assert_eq!(tree_width(5, 0), 5);
        assert_eq!(tree_width(5, 1), 3);
        assert_eq!(tree_width(5, 2), 2);
        assert_eq!(tree_width(5, 3), 1);
    }

    #[test]
    fn descendants_are_post_order() {
        let tree = MerkleTree::build_empty_shape(3).unwrap();
        let order: Vec<_> = tree.descendants(tree.root()).collect();
        // a, b, ab, c, c_, root
        assert_eq!(order, vec![0, 1, 3, 2, 4, 5]);

        // restartable
        assert_eq!(tree.descendants(tree.root()).count(), 6);
        assert_eq!(tree.descendants(1).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn ancestors_run_to_the_root() {
        let tree = MerkleTree::build_empty_shape(5).unwrap();
        let path: Vec<_> = tree.ancestors(4).collect();
        assert_eq!(path.len() as u32, tree.height());
        assert_eq!(path.last(), Some(&tree.root()));
        assert_eq!(tree.ancestors(tree.root()).next(), None);
        assert_eq!(tree.leaves(), 0..5);
    }

    #[test]
    fn recompute_keeps_hash_when_a_child_is_unknown() {
        let mut tree = MerkleTree::build_empty_shape(2).unwrap();
        let root = tree.root();
        tree.set_hash(0, leaf(1));
        tree.recompute_hash::<Sha256dHasher>(root);
        assert_eq!(tree.hash(root), None);

        tree.set_hash(1, leaf(2));
        tree.recompute_hash::<Sha256dHasher>(root);
        assert_eq!(
            tree.hash(root),
            Some(&Sha256dHasher::hash_pair(&leaf(1), &leaf(2)))
        );
    }

    #[test]
    fn marking_a_leaf_marks_its_path() {
        let tree = MerkleTree::build_empty_shape(4).unwrap();
        let mut marks = Marks::new(&tree);
        assert!((0..tree.len()).all(|i| !marks.is_marked(i)));

        marks.mark_path(&tree, 2);
        let marked: Vec<_> = (0..tree.len()).filter(|i| marks.is_marked(*i)).collect();
        // leaf 2, its parent (5) and the root (6)
        assert_eq!(marked, vec![2, 5, 6]);
    }
}
