//! Nullifier epochs.
//!
//! Insertions into the indexed tree are grouped into epochs. Closing an
//! epoch snapshots the tree root; proofs may reference the root of any epoch
//! in `[earliest_provable_epoch, current_epoch)` or the live root.
//!
//! Lifecycle:
//!
//! 1. Withdrawals create pending records in the current epoch.
//! 2. Pending records are batch-inserted into the tree.
//! 3. [`EpochLedger::advance`] closes the epoch and stores its root.
//! 4. [`EpochLedger::advance_earliest_provable`] retires old roots, always
//!    keeping the most recent `retained_epochs` closed epochs provable.
//! 5. Records inserted before the earliest provable epoch may be reclaimed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shroud_types::MerkleRoot;

use crate::{NullifierError, Result};

/// Epoch cursors and the retained root window.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochLedger {
    current_epoch: u64,
    earliest_provable_epoch: u64,
    last_advance_time: u64,
    /// Tree length at the last epoch close.
    last_finalized_len: u64,
    min_epoch_secs: u64,
    #[serde_as(as = "BTreeMap<_, Hex>")]
    roots: BTreeMap<u64, MerkleRoot>,
}

/// Summary of a closed epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClosedEpoch {
    pub epoch: u64,
    pub root: MerkleRoot,
    /// Leaves added to the tree during the epoch.
    pub committed: u64,
}

impl EpochLedger {
    pub fn new(min_epoch_secs: u64, genesis_time: u64, genesis_len: u64) -> Self {
        Self {
            current_epoch: 0,
            earliest_provable_epoch: 0,
            last_advance_time: genesis_time,
            last_finalized_len: genesis_len,
            min_epoch_secs,
            roots: BTreeMap::new(),
        }
    }

    /// Restore from persisted cursors.
    pub fn from_parts(
        current_epoch: u64,
        earliest_provable_epoch: u64,
        last_advance_time: u64,
        last_finalized_len: u64,
        min_epoch_secs: u64,
        roots: BTreeMap<u64, MerkleRoot>,
    ) -> Result<Self> {
        if earliest_provable_epoch > current_epoch {
            return Err(NullifierError::Inconsistent(format!(
                "earliest provable epoch {earliest_provable_epoch} after current {current_epoch}"
            )));
        }
        if roots
            .keys()
            .any(|&e| e < earliest_provable_epoch || e >= current_epoch)
        {
            return Err(NullifierError::Inconsistent(
                "epoch root outside provable window".into(),
            ));
        }
        Ok(Self {
            current_epoch,
            earliest_provable_epoch,
            last_advance_time,
            last_finalized_len,
            min_epoch_secs,
            roots,
        })
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn earliest_provable_epoch(&self) -> u64 {
        self.earliest_provable_epoch
    }

    pub fn last_advance_time(&self) -> u64 {
        self.last_advance_time
    }

    pub fn last_finalized_len(&self) -> u64 {
        self.last_finalized_len
    }

    pub fn min_epoch_secs(&self) -> u64 {
        self.min_epoch_secs
    }

    pub fn roots(&self) -> &BTreeMap<u64, MerkleRoot> {
        &self.roots
    }

    pub fn root_of(&self, epoch: u64) -> Option<&MerkleRoot> {
        self.roots.get(&epoch)
    }

    /// Whether `root` is the snapshot of a still-provable epoch.
    pub fn is_provable_root(&self, root: &MerkleRoot) -> bool {
        self.roots.values().any(|r| r == root)
    }

    /// Close the current epoch.
    ///
    /// With nothing pending the epoch may close at any time; otherwise at
    /// least `min_epoch_secs` must have elapsed since the previous close.
    pub fn advance(
        &mut self,
        now: u64,
        pending: usize,
        root: MerkleRoot,
        tree_len: u64,
    ) -> Result<ClosedEpoch> {
        let allowed_at = self.last_advance_time.saturating_add(self.min_epoch_secs);
        if pending > 0 && now < allowed_at {
            return Err(NullifierError::EpochAdvanceTooEarly {
                pending,
                allowed_at,
            });
        }

        let closed = ClosedEpoch {
            epoch: self.current_epoch,
            root,
            committed: tree_len.saturating_sub(self.last_finalized_len),
        };
        self.roots.insert(self.current_epoch, root);
        self.current_epoch += 1;
        self.last_advance_time = now;
        self.last_finalized_len = tree_len;

        tracing::info!(
            epoch = closed.epoch,
            committed = closed.committed,
            pending,
            "nullifier epoch closed"
        );
        Ok(closed)
    }

    /// Move the earliest-provable cursor forward and drop older roots.
    ///
    /// The roots of the last `retained_epochs` closed epochs are never
    /// dropped, so a proof built against one of them stays valid until it
    /// has aged past that window.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::InvalidEpochCursor`] if `epoch` moves backwards
    ///   or into the retained window
    pub fn advance_earliest_provable(&mut self, epoch: u64, retained_epochs: u64) -> Result<usize> {
        let latest = self.current_epoch.saturating_sub(retained_epochs);
        if epoch < self.earliest_provable_epoch || epoch > latest {
            return Err(NullifierError::InvalidEpochCursor {
                requested: epoch,
                earliest: self.earliest_provable_epoch,
                latest,
            });
        }
        let before = self.roots.len();
        self.roots = self.roots.split_off(&epoch);
        self.earliest_provable_epoch = epoch;
        let dropped = before - self.roots.len();
        tracing::debug!(epoch, dropped, "earliest provable epoch advanced");
        Ok(dropped)
    }
}
