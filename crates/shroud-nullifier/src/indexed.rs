//! Indexed Merkle tree of spent nullifiers.
//!
//! Each leaf stores a value plus a pointer to the next larger value present
//! in the tree, forming a sorted linked list threaded through an append-only
//! leaf array. Absence of `x` is proven by the unique "low" leaf with
//! `low.value < x < low.next_value`, or `low.next_value == 0` when `x` is
//! larger than every present value.
//!
//! ## Layout
//!
//! - Leaf 0 is the genesis leaf `(0, 0, 0)`; value zero is therefore reserved.
//! - Leaf hash: `H(value, next_value, next_index)`.
//! - Empty slots hash to zero; inner nodes are `H(left, right)`.
//! - Insertion rewrites the low leaf and appends the new one: two path updates.

use std::collections::BTreeMap;

use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shroud_crypto::field::{bytes_to_field, field_to_bytes};
use shroud_crypto::{poseidon, Fr};
use shroud_types::{FieldBytes, MerkleRoot};

use crate::{NullifierError, Result};

/// Largest supported tree height.
pub const MAX_HEIGHT: u8 = 32;

const ZERO: FieldBytes = [0u8; 32];

/// One element of the sorted linked list.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedLeaf {
    #[serde_as(as = "Hex")]
    pub value: FieldBytes,
    /// Next larger value present, or zero if this is the largest.
    #[serde_as(as = "Hex")]
    pub next_value: FieldBytes,
    /// Leaf index of `next_value`, zero if this is the largest.
    pub next_index: u64,
}

impl IndexedLeaf {
    pub const fn genesis() -> Self {
        Self {
            value: ZERO,
            next_value: ZERO,
            next_index: 0,
        }
    }

    pub fn hash(&self) -> Result<Fr> {
        let inputs = [
            bytes_to_field(&self.value)?,
            bytes_to_field(&self.next_value)?,
            Fr::from(self.next_index),
        ];
        Ok(poseidon::hash(&inputs)?)
    }

    /// Whether this leaf is the low element for `value`.
    ///
    /// Big-endian encodings order the same way as the integers they encode.
    pub fn brackets(&self, value: &FieldBytes) -> bool {
        self.value < *value && (self.next_value == ZERO || *value < self.next_value)
    }
}

/// Proof that a value is absent from the tree at a given root.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonMembershipWitness {
    #[serde_as(as = "Hex")]
    pub value: FieldBytes,
    pub low_leaf: IndexedLeaf,
    pub low_index: u64,
    /// Sibling hashes from the leaf level up.
    #[serde_as(as = "Vec<Hex>")]
    pub siblings: Vec<FieldBytes>,
    #[serde_as(as = "Hex")]
    pub root: MerkleRoot,
}

impl NonMembershipWitness {
    /// Recompute the root from the low leaf and check the bracketing.
    pub fn verify(&self) -> Result<bool> {
        if !self.low_leaf.brackets(&self.value) {
            return Ok(false);
        }
        let mut node = self.low_leaf.hash()?;
        let mut index = self.low_index;
        for sibling in &self.siblings {
            let sibling = bytes_to_field(sibling)?;
            node = if index & 1 == 0 {
                poseidon::hash2(&node, &sibling)?
            } else {
                poseidon::hash2(&sibling, &node)?
            };
            index >>= 1;
        }
        Ok(index == 0 && field_to_bytes(&node) == self.root)
    }
}

/// The committed nullifier tree.
#[derive(Clone, Debug)]
pub struct IndexedTree {
    height: u8,
    leaves: Vec<IndexedLeaf>,
    /// Value to leaf index, for low-element search.
    sorted: BTreeMap<FieldBytes, u64>,
    /// `layers[0]` holds leaf hashes, `layers[height]` the root.
    layers: Vec<Vec<Fr>>,
    zeros: Vec<Fr>,
}

impl IndexedTree {
    /// Create a tree containing only the genesis leaf.
    pub fn new(height: u8) -> Result<Self> {
        let mut tree = Self::empty(height)?;
        tree.push_leaf(IndexedLeaf::genesis())?;
        Ok(tree)
    }

    fn empty(height: u8) -> Result<Self> {
        if height == 0 || height > MAX_HEIGHT {
            return Err(NullifierError::InvalidConfig(format!(
                "tree height {height} outside 1..={MAX_HEIGHT}"
            )));
        }
        Ok(Self {
            height,
            leaves: Vec::new(),
            sorted: BTreeMap::new(),
            layers: vec![Vec::new(); usize::from(height) + 1],
            zeros: poseidon::zero_hashes(usize::from(height))?,
        })
    }

    /// Rebuild a tree from its leaf array, validating the linked list.
    pub fn from_leaves(height: u8, leaves: Vec<IndexedLeaf>) -> Result<Self> {
        let mut tree = Self::empty(height)?;
        if leaves.first().map(|l| l.value) != Some(ZERO) {
            return Err(NullifierError::Inconsistent(
                "leaf 0 is not the genesis leaf".into(),
            ));
        }
        if leaves.len() as u64 > tree.capacity() {
            return Err(NullifierError::TreeFull {
                capacity: tree.capacity(),
            });
        }
        validate_chain(&leaves)?;
        for leaf in leaves {
            tree.push_leaf(leaf)?;
        }
        Ok(tree)
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Number of leaves, including genesis.
    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.len() <= 1
    }

    pub fn remaining(&self) -> u64 {
        self.capacity().saturating_sub(self.len())
    }

    pub fn leaves(&self) -> &[IndexedLeaf] {
        &self.leaves
    }

    pub fn root(&self) -> MerkleRoot {
        let top = usize::from(self.height);
        let root = self.layers[top].first().copied().unwrap_or(self.zeros[top]);
        field_to_bytes(&root)
    }

    pub fn contains(&self, value: &FieldBytes) -> bool {
        *value != ZERO && self.sorted.contains_key(value)
    }

    /// The leaf whose gap contains `value`.
    pub fn low_leaf(&self, value: &FieldBytes) -> Option<(u64, IndexedLeaf)> {
        self.sorted
            .range(..*value)
            .next_back()
            .and_then(|(_, &i)| self.leaves.get(i as usize).map(|leaf| (i, *leaf)))
    }

    /// Insert a new value, re-linking its low neighbour.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::ReservedValue`] for zero
    /// - [`NullifierError::NullifierAlreadyUsed`] if already present
    /// - [`NullifierError::TreeFull`] when no leaf slot is free
    pub fn insert(&mut self, value: FieldBytes) -> Result<u64> {
        if bytes_to_field(&value)?.is_zero() {
            return Err(NullifierError::ReservedValue);
        }
        if self.contains(&value) {
            return Err(NullifierError::already_used(&value));
        }
        if self.remaining() == 0 {
            return Err(NullifierError::TreeFull {
                capacity: self.capacity(),
            });
        }
        let (low_index, low) = self
            .low_leaf(&value)
            .ok_or_else(|| NullifierError::Inconsistent("missing genesis leaf".into()))?;

        let new_index = self.len();
        let new_leaf = IndexedLeaf {
            value,
            next_value: low.next_value,
            next_index: low.next_index,
        };
        let relinked = IndexedLeaf {
            next_value: value,
            next_index: new_index,
            ..low
        };
        // Hash both before touching the arrays.
        let relinked_hash = relinked.hash()?;
        let new_hash = new_leaf.hash()?;

        self.leaves[low_index as usize] = relinked;
        self.update_path(low_index, relinked_hash)?;
        self.leaves.push(new_leaf);
        self.sorted.insert(value, new_index);
        self.update_path(new_index, new_hash)?;
        Ok(new_index)
    }

    /// Sibling path for a leaf, bottom-up.
    pub fn siblings(&self, index: u64) -> Vec<FieldBytes> {
        let mut idx = index as usize;
        let mut path = Vec::with_capacity(usize::from(self.height));
        for level in 0..usize::from(self.height) {
            let sibling = self.layers[level]
                .get(idx ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            path.push(field_to_bytes(&sibling));
            idx >>= 1;
        }
        path
    }

    /// Build a non-membership witness for `value` against the current root.
    pub fn non_membership_witness(&self, value: &FieldBytes) -> Result<NonMembershipWitness> {
        if bytes_to_field(value)?.is_zero() {
            return Err(NullifierError::ReservedValue);
        }
        if self.contains(value) {
            return Err(NullifierError::already_used(value));
        }
        let (low_index, low_leaf) = self
            .low_leaf(value)
            .ok_or_else(|| NullifierError::Inconsistent("missing genesis leaf".into()))?;
        Ok(NonMembershipWitness {
            value: *value,
            low_leaf,
            low_index,
            siblings: self.siblings(low_index),
            root: self.root(),
        })
    }

    fn push_leaf(&mut self, leaf: IndexedLeaf) -> Result<()> {
        let index = self.len();
        let hash = leaf.hash()?;
        if leaf.value != ZERO || index == 0 {
            self.sorted.insert(leaf.value, index);
        }
        self.leaves.push(leaf);
        self.update_path(index, hash)
    }

    fn update_path(&mut self, index: u64, leaf_hash: Fr) -> Result<()> {
        let mut idx = index as usize;
        set_node(&mut self.layers[0], idx, leaf_hash);
        for level in 0..usize::from(self.height) {
            let left_idx = idx & !1;
            let left = self.layers[level][left_idx];
            let right = self.layers[level]
                .get(left_idx + 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            let parent = poseidon::hash2(&left, &right)?;
            idx >>= 1;
            set_node(&mut self.layers[level + 1], idx, parent);
        }
        Ok(())
    }
}

fn set_node(layer: &mut Vec<Fr>, index: usize, value: Fr) {
    if index < layer.len() {
        layer[index] = value;
    } else {
        layer.push(value);
    }
}

/// Walk the linked list from genesis and check it visits every leaf once,
/// in strictly increasing order.
fn validate_chain(leaves: &[IndexedLeaf]) -> Result<()> {
    let mut current = 0usize;
    let mut visited = 1usize;
    while let Some(leaf) = leaves.get(current) {
        if leaf.next_value == ZERO {
            break;
        }
        let next = leaf.next_index as usize;
        let ok = leaves
            .get(next)
            .is_some_and(|n| n.value == leaf.next_value && n.value > leaf.value);
        if !ok || visited >= leaves.len() {
            return Err(NullifierError::Inconsistent(format!(
                "broken link at leaf {current}"
            )));
        }
        current = next;
        visited += 1;
    }
    if visited != leaves.len() {
        return Err(NullifierError::Inconsistent(format!(
            "linked list covers {visited} of {} leaves",
            leaves.len()
        )));
    }
    Ok(())
}
