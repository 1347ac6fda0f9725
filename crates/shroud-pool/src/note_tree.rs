//! Append-only note commitment tree.
//!
//! An incremental Merkle tree: appends touch only the frontier of filled
//! left subtrees, so each deposit costs `height` hashes. A bounded ring of
//! recent roots lets withdrawals prove against a root that was current a
//! few deposits ago.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shroud_crypto::field::{bytes_to_field, field_to_bytes};
use shroud_crypto::{poseidon, Fr};
use shroud_types::{Commitment, FieldBytes, MerkleRoot};

use crate::{PoolError, Result};

/// Largest supported tree height.
pub const MAX_TREE_HEIGHT: u8 = 32;

/// Persistable note tree state. Leaves are kept so the frontier and the
/// root history can be rebuilt and checked.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTreeSnapshot {
    pub height: u8,
    pub history_size: usize,
    #[serde_as(as = "Vec<Hex>")]
    pub leaves: Vec<Commitment>,
    /// Root history, oldest first.
    #[serde_as(as = "Vec<Hex>")]
    pub roots: Vec<MerkleRoot>,
}

/// Incremental Merkle tree of deposit commitments.
#[derive(Clone, Debug)]
pub struct NoteTree {
    height: u8,
    history_size: usize,
    zeros: Vec<Fr>,
    filled_subtrees: Vec<Fr>,
    leaves: Vec<Commitment>,
    root: MerkleRoot,
    roots: VecDeque<MerkleRoot>,
}

impl NoteTree {
    /// An empty tree whose history holds only the empty root.
    pub fn new(height: u8, history_size: usize) -> Result<Self> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(PoolError::InvalidConfig(format!(
                "note tree height {height} outside 1..={MAX_TREE_HEIGHT}"
            )));
        }
        if history_size == 0 {
            return Err(PoolError::InvalidConfig(
                "root history must hold at least one root".into(),
            ));
        }
        let zeros = poseidon::zero_hashes(height as usize)?;
        let root = field_to_bytes(&zeros[height as usize]);
        let filled_subtrees = zeros[..height as usize].to_vec();
        let mut roots = VecDeque::with_capacity(history_size);
        roots.push_back(root);
        Ok(Self {
            height,
            history_size,
            zeros,
            filled_subtrees,
            leaves: Vec::new(),
            root,
            roots,
        })
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Index the next appended leaf will take.
    pub fn next_index(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn leaves(&self) -> &[Commitment] {
        &self.leaves
    }

    pub fn root(&self) -> MerkleRoot {
        self.root
    }

    /// Root history, oldest first.
    pub fn roots(&self) -> impl Iterator<Item = &MerkleRoot> {
        self.roots.iter()
    }

    /// Whether `root` is in the accepted history. The all-zero value is
    /// never a root.
    pub fn is_known_root(&self, root: &MerkleRoot) -> bool {
        *root != [0u8; 32] && self.roots.contains(root)
    }

    /// Append a commitment, returning its leaf index and the new root.
    ///
    /// # Errors
    ///
    /// - [`PoolError::TreeFull`] once `2^height` leaves exist
    /// - [`PoolError::Crypto`] for a non-canonical commitment
    pub fn append(&mut self, commitment: Commitment) -> Result<(u64, MerkleRoot)> {
        let leaf_index = self.next_index();
        if leaf_index >= self.capacity() {
            return Err(PoolError::TreeFull {
                capacity: self.capacity(),
            });
        }

        let mut node = bytes_to_field(&commitment)?;
        let mut filled = self.filled_subtrees.clone();
        let mut index = leaf_index;
        for (level, slot) in filled.iter_mut().enumerate() {
            let (left, right) = if index & 1 == 0 {
                *slot = node;
                (node, self.zeros[level])
            } else {
                (*slot, node)
            };
            node = poseidon::hash2(&left, &right)?;
            index >>= 1;
        }

        let root = field_to_bytes(&node);
        self.filled_subtrees = filled;
        self.leaves.push(commitment);
        self.root = root;
        if self.roots.len() == self.history_size {
            self.roots.pop_front();
        }
        self.roots.push_back(root);

        tracing::debug!(leaf_index, root = %hex::encode(root), "note appended");
        Ok((leaf_index, root))
    }

    /// Sibling path of `leaf_index` against the current root, leaf level first.
    pub fn path(&self, leaf_index: u64) -> Result<Vec<FieldBytes>> {
        if leaf_index >= self.next_index() {
            return Err(PoolError::InvalidArgument(format!(
                "leaf {leaf_index} not yet appended ({} leaves)",
                self.next_index()
            )));
        }
        let mut layer = self
            .leaves
            .iter()
            .map(bytes_to_field)
            .collect::<shroud_crypto::Result<Vec<_>>>()?;
        let mut index = leaf_index as usize;
        let mut siblings = Vec::with_capacity(self.height as usize);

        for level in 0..self.height as usize {
            let zero = self.zeros[level];
            let sibling = layer.get(index ^ 1).copied().unwrap_or(zero);
            siblings.push(field_to_bytes(&sibling));

            layer = layer
                .chunks(2)
                .map(|pair| poseidon::hash2(&pair[0], pair.get(1).unwrap_or(&zero)))
                .collect::<shroud_crypto::Result<Vec<_>>>()?;
            index >>= 1;
        }
        Ok(siblings)
    }

    pub fn snapshot(&self) -> NoteTreeSnapshot {
        NoteTreeSnapshot {
            height: self.height,
            history_size: self.history_size,
            leaves: self.leaves.clone(),
            roots: self.roots.iter().copied().collect(),
        }
    }

    /// Rebuild a tree by replaying its leaves, then check the replayed
    /// root history against the stored one.
    pub fn restore(snapshot: &NoteTreeSnapshot) -> Result<Self> {
        let mut tree = Self::new(snapshot.height, snapshot.history_size)?;
        for leaf in &snapshot.leaves {
            tree.append(*leaf)?;
        }
        if !tree.roots.iter().eq(snapshot.roots.iter()) {
            return Err(PoolError::Inconsistent(
                "note tree root history does not match its leaves".into(),
            ));
        }
        Ok(tree)
    }
}
