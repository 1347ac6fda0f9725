//! Two-layer nullifier registry.
//!
//! Layer one is a transient record per spent nullifier, created inside the
//! withdrawal that spends it. Layer two is the indexed tree, filled from the
//! pending queue in batches. At every point the union of the two layers
//! contains every spent nullifier; a record is only dropped once the tree
//! holds the nullifier and no provable root predates its insertion.

use std::collections::{BTreeMap, VecDeque};

use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shroud_crypto::field::bytes_to_field;
use shroud_types::{MerkleRoot, NullifierHash};

use crate::bloom::{MembershipFilter, DEFAULT_FILTER_BYTES, DEFAULT_HASH_COUNT};
use crate::epoch::{ClosedEpoch, EpochLedger};
use crate::indexed::{IndexedLeaf, IndexedTree, NonMembershipWitness, MAX_HEIGHT};
use crate::{NullifierError, Result};

/// Registry parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Height of the indexed tree.
    pub tree_height: u8,
    /// Pending records are committed to the tree once this many accumulate.
    pub batch_size: usize,
    /// Minimum epoch length while pending records exist, in seconds.
    pub min_epoch_secs: u64,
    pub filter_bytes: usize,
    pub filter_hashes: u8,
    /// Closed epochs whose roots stay provable however far the
    /// earliest-provable cursor is pushed.
    pub retained_epochs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tree_height: 26,
            batch_size: 16,
            min_epoch_secs: 3600,
            filter_bytes: DEFAULT_FILTER_BYTES,
            filter_hashes: DEFAULT_HASH_COUNT,
            retained_epochs: 24,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tree_height == 0 || self.tree_height > MAX_HEIGHT {
            return Err(NullifierError::InvalidConfig(format!(
                "tree_height {} outside 1..={MAX_HEIGHT}",
                self.tree_height
            )));
        }
        if self.batch_size == 0 {
            return Err(NullifierError::InvalidConfig(
                "batch_size must be non-zero".into(),
            ));
        }
        if self.filter_bytes == 0 || self.filter_hashes == 0 {
            return Err(NullifierError::InvalidConfig(
                "filter size and hash count must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Where a spent nullifier currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    /// Recorded, not yet in the tree.
    Pending,
    /// Inserted into the tree at `leaf_index` during `inserted_epoch`.
    Committed { leaf_index: u64, inserted_epoch: u64 },
}

/// Transient per-nullifier record.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierRecord {
    #[serde_as(as = "Hex")]
    pub nullifier: NullifierHash,
    /// Epoch in which the nullifier was spent.
    pub spent_epoch: u64,
    pub spent_at: u64,
    /// Position in the pending queue, strictly increasing across the registry's life.
    pub pending_index: u64,
    pub state: RecordState,
}

/// Persistable registry state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub tree_height: u8,
    pub leaves: Vec<IndexedLeaf>,
    /// Records ordered by `pending_index`.
    pub records: Vec<NullifierRecord>,
    pub next_pending_index: u64,
    pub reclaimed: u64,
    pub epochs: EpochLedger,
}

/// The nullifier registry.
#[derive(Clone, Debug)]
pub struct NullifierRegistry {
    config: RegistryConfig,
    tree: IndexedTree,
    records: BTreeMap<NullifierHash, NullifierRecord>,
    pending: VecDeque<NullifierHash>,
    next_pending_index: u64,
    reclaimed: u64,
    epochs: EpochLedger,
    filter: MembershipFilter,
}

impl NullifierRegistry {
    /// Create an empty registry whose first epoch starts at `now`.
    pub fn new(config: RegistryConfig, now: u64) -> Result<Self> {
        config.validate()?;
        let tree = IndexedTree::new(config.tree_height)?;
        let epochs = EpochLedger::new(config.min_epoch_secs, now, tree.len());
        let filter = MembershipFilter::new(config.filter_bytes, config.filter_hashes)?;
        Ok(Self {
            config,
            tree,
            records: BTreeMap::new(),
            pending: VecDeque::new(),
            next_pending_index: 0,
            reclaimed: 0,
            epochs,
            filter,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn tree(&self) -> &IndexedTree {
        &self.tree
    }

    pub fn epochs(&self) -> &EpochLedger {
        &self.epochs
    }

    pub fn root(&self) -> MerkleRoot {
        self.tree.root()
    }

    pub fn current_epoch(&self) -> u64 {
        self.epochs.current_epoch()
    }

    pub fn earliest_provable_epoch(&self) -> u64 {
        self.epochs.earliest_provable_epoch()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn reclaimed_count(&self) -> u64 {
        self.reclaimed
    }

    pub fn record(&self, nullifier: &NullifierHash) -> Option<&NullifierRecord> {
        self.records.get(nullifier)
    }

    /// Whether enough records are pending to fill a batch.
    pub fn batch_ready(&self) -> bool {
        self.pending.len() >= self.config.batch_size
    }

    fn validate(nullifier: &NullifierHash) -> Result<()> {
        if bytes_to_field(nullifier)?.is_zero() {
            return Err(NullifierError::ReservedValue);
        }
        Ok(())
    }

    /// Whether the nullifier has been spent.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::Crypto`] for a non-canonical encoding
    /// - [`NullifierError::ReservedValue`] for zero
    pub fn exists(&self, nullifier: &NullifierHash) -> Result<bool> {
        Self::validate(nullifier)?;
        if !self.filter.may_contain(nullifier) {
            return Ok(false);
        }
        Ok(self.covers(nullifier))
    }

    /// Exact two-layer lookup, bypassing the prefilter.
    pub fn covers(&self, nullifier: &NullifierHash) -> bool {
        self.records.contains_key(nullifier) || self.tree.contains(nullifier)
    }

    /// Check that `nullifier` is unspent and record it, as one step.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::NullifierAlreadyUsed`] if it was spent before
    /// - [`NullifierError::Crypto`] / [`NullifierError::ReservedValue`] as for [`Self::exists`]
    pub fn insert(&mut self, nullifier: NullifierHash, now: u64) -> Result<&NullifierRecord> {
        if self.exists(&nullifier)? {
            tracing::warn!(nullifier = %hex::encode(nullifier), "nullifier replay rejected");
            return Err(NullifierError::already_used(&nullifier));
        }

        let record = NullifierRecord {
            nullifier,
            spent_epoch: self.epochs.current_epoch(),
            spent_at: now,
            pending_index: self.next_pending_index,
            state: RecordState::Pending,
        };
        self.next_pending_index += 1;
        self.pending.push_back(nullifier);
        self.filter.insert(&nullifier);
        tracing::debug!(
            pending_index = record.pending_index,
            epoch = record.spent_epoch,
            "nullifier recorded"
        );
        let stored = self.records.entry(nullifier).or_insert(record);
        Ok(&*stored)
    }

    /// Move up to `max` pending records into the tree, oldest first.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::TreeFull`] if records are pending and the tree has no room
    pub fn commit_pending(&mut self, max: usize) -> Result<usize> {
        if !self.pending.is_empty() && self.tree.remaining() == 0 {
            return Err(NullifierError::TreeFull {
                capacity: self.tree.capacity(),
            });
        }
        let room = usize::try_from(self.tree.remaining()).unwrap_or(usize::MAX);
        let take = max.min(self.pending.len()).min(room);
        let epoch = self.epochs.current_epoch();

        for _ in 0..take {
            let Some(&nullifier) = self.pending.front() else {
                break;
            };
            let record = self.records.get_mut(&nullifier).ok_or_else(|| {
                NullifierError::Inconsistent(format!(
                    "pending nullifier 0x{} has no record",
                    hex::encode(nullifier)
                ))
            })?;
            let leaf_index = self.tree.insert(nullifier)?;
            record.state = RecordState::Committed {
                leaf_index,
                inserted_epoch: epoch,
            };
            self.pending.pop_front();
        }

        if take > 0 {
            tracing::debug!(
                committed = take,
                epoch,
                remaining = self.pending.len(),
                "pending nullifiers committed"
            );
        }
        Ok(take)
    }

    /// Close the current epoch, snapshotting the tree root.
    pub fn advance_epoch(&mut self, now: u64) -> Result<ClosedEpoch> {
        self.epochs
            .advance(now, self.pending.len(), self.tree.root(), self.tree.len())
    }

    /// Move the earliest-provable cursor forward, short of the last
    /// `retained_epochs` closed epochs.
    pub fn advance_earliest_provable(&mut self, epoch: u64) -> Result<usize> {
        self.epochs
            .advance_earliest_provable(epoch, self.config.retained_epochs)
    }

    /// Whether a proof may reference `root`: the live root or a provable epoch root.
    pub fn is_provable_root(&self, root: &MerkleRoot) -> bool {
        *root == self.tree.root() || self.epochs.is_provable_root(root)
    }

    fn reclaimable(&self, record: &NullifierRecord) -> std::result::Result<(), String> {
        match record.state {
            RecordState::Pending => Err("still pending".into()),
            RecordState::Committed { inserted_epoch, .. }
                if inserted_epoch >= self.epochs.earliest_provable_epoch() =>
            {
                Err(format!(
                    "inserted in epoch {inserted_epoch}, earliest provable is {}",
                    self.epochs.earliest_provable_epoch()
                ))
            }
            RecordState::Committed { .. } if !self.tree.contains(&record.nullifier) => {
                Err("committed record missing from tree".into())
            }
            RecordState::Committed { .. } => Ok(()),
        }
    }

    /// Drop the transient record of one nullifier.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::UnknownNullifier`] if no record exists
    /// - [`NullifierError::NotReclaimable`] if the record is still needed
    pub fn reclaim(&mut self, nullifier: &NullifierHash) -> Result<()> {
        let record = self
            .records
            .get(nullifier)
            .ok_or_else(|| NullifierError::UnknownNullifier {
                nullifier: hex::encode(nullifier),
            })?;
        self.reclaimable(record)
            .map_err(NullifierError::NotReclaimable)?;
        self.records.remove(nullifier);
        self.reclaimed += 1;
        Ok(())
    }

    /// Drop up to `limit` reclaimable records. Returns how many were dropped.
    pub fn reclaim_expired(&mut self, limit: usize) -> usize {
        let eligible: Vec<NullifierHash> = self
            .records
            .values()
            .filter(|r| self.reclaimable(r).is_ok())
            .take(limit)
            .map(|r| r.nullifier)
            .collect();
        for nullifier in &eligible {
            self.records.remove(nullifier);
        }
        self.reclaimed += eligible.len() as u64;
        if !eligible.is_empty() {
            tracing::debug!(
                reclaimed = eligible.len(),
                earliest_provable = self.epochs.earliest_provable_epoch(),
                "nullifier records reclaimed"
            );
        }
        eligible.len()
    }

    /// Non-membership witness against the live tree root.
    ///
    /// Refused for nullifiers that are only recorded in the transient layer.
    pub fn non_membership_witness(&self, nullifier: &NullifierHash) -> Result<NonMembershipWitness> {
        Self::validate(nullifier)?;
        if self.records.contains_key(nullifier) {
            return Err(NullifierError::already_used(nullifier));
        }
        self.tree.non_membership_witness(nullifier)
    }

    /// Check the structural invariants linking records, queue and tree.
    pub fn audit(&self) -> Result<()> {
        let pending_records = self
            .records
            .values()
            .filter(|r| r.state == RecordState::Pending)
            .count();
        if pending_records != self.pending.len() {
            return Err(NullifierError::Inconsistent(format!(
                "{pending_records} pending records but {} queued",
                self.pending.len()
            )));
        }
        for nullifier in &self.pending {
            match self.records.get(nullifier) {
                Some(r) if r.state == RecordState::Pending => {}
                _ => {
                    return Err(NullifierError::Inconsistent(format!(
                        "queued nullifier 0x{} is not a pending record",
                        hex::encode(nullifier)
                    )))
                }
            }
        }
        for record in self.records.values() {
            if record.pending_index >= self.next_pending_index {
                return Err(NullifierError::Inconsistent(format!(
                    "pending index {} beyond counter {}",
                    record.pending_index, self.next_pending_index
                )));
            }
            if let RecordState::Committed { leaf_index, .. } = record.state {
                let leaf = self.tree.leaves().get(leaf_index as usize);
                if leaf.map(|l| l.value) != Some(record.nullifier) {
                    return Err(NullifierError::Inconsistent(format!(
                        "record claims leaf {leaf_index} but the tree disagrees"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut records: Vec<NullifierRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.pending_index);
        RegistrySnapshot {
            tree_height: self.tree.height(),
            leaves: self.tree.leaves().to_vec(),
            records,
            next_pending_index: self.next_pending_index,
            reclaimed: self.reclaimed,
            epochs: self.epochs.clone(),
        }
    }

    /// Rebuild a registry from a snapshot and audit the result.
    pub fn restore(config: RegistryConfig, snapshot: RegistrySnapshot) -> Result<Self> {
        config.validate()?;
        if snapshot.tree_height != config.tree_height {
            return Err(NullifierError::InvalidConfig(format!(
                "snapshot tree height {} differs from configured {}",
                snapshot.tree_height, config.tree_height
            )));
        }

        let tree = IndexedTree::from_leaves(snapshot.tree_height, snapshot.leaves)?;
        let mut filter = MembershipFilter::new(config.filter_bytes, config.filter_hashes)?;
        for leaf in tree.leaves().iter().skip(1) {
            filter.insert(&leaf.value);
        }

        let mut pending = VecDeque::new();
        let mut records = BTreeMap::new();
        for record in snapshot.records {
            if record.state == RecordState::Pending {
                pending.push_back(record.nullifier);
            }
            filter.insert(&record.nullifier);
            if records.insert(record.nullifier, record).is_some() {
                return Err(NullifierError::Inconsistent("duplicate record".into()));
            }
        }

        let e = &snapshot.epochs;
        let epochs = EpochLedger::from_parts(
            e.current_epoch(),
            e.earliest_provable_epoch(),
            e.last_advance_time(),
            e.last_finalized_len(),
            config.min_epoch_secs,
            e.roots().clone(),
        )?;

        let registry = Self {
            config,
            tree,
            records,
            pending,
            next_pending_index: snapshot.next_pending_index,
            reclaimed: snapshot.reclaimed,
            epochs,
            filter,
        };
        registry.audit()?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::field::u64_to_bytes;

    fn config() -> RegistryConfig {
        RegistryConfig {
            tree_height: 8,
            batch_size: 2,
            min_epoch_secs: 100,
            filter_bytes: 4096,
            filter_hashes: 4,
            retained_epochs: 0,
        }
    }

    fn registry() -> NullifierRegistry {
        NullifierRegistry::new(config(), 1_000).expect("registry")
    }

    #[test]
    fn test_insert_then_replay() {
        let mut reg = registry();
        let n = u64_to_bytes(77);
        assert!(!reg.exists(&n).expect("exists"));
        reg.insert(n, 1_001).expect("first spend");
        assert!(reg.exists(&n).expect("exists"));
        let err = reg.insert(n, 1_002).expect_err("replay");
        assert!(matches!(err, NullifierError::NullifierAlreadyUsed { .. }));
        assert_eq!(reg.record_count(), 1);
    }

    #[test]
    fn test_replay_after_commit_still_rejected() {
        let mut reg = registry();
        let n = u64_to_bytes(5);
        reg.insert(n, 1_001).expect("spend");
        assert_eq!(reg.commit_pending(10).expect("commit"), 1);
        assert!(reg.tree().contains(&n));
        assert!(reg.insert(n, 1_002).is_err());
    }

    #[test]
    fn test_reserved_and_noncanonical_rejected() {
        let mut reg = registry();
        assert!(matches!(
            reg.insert([0u8; 32], 1),
            Err(NullifierError::ReservedValue)
        ));
        assert!(matches!(
            reg.insert([0xFF; 32], 1),
            Err(NullifierError::Crypto(_))
        ));
    }

    #[test]
    fn test_commit_pending_respects_max_and_order() {
        let mut reg = registry();
        for v in [30, 10, 20] {
            reg.insert(u64_to_bytes(v), 1_001).expect("spend");
        }
        assert!(reg.batch_ready());
        assert_eq!(reg.commit_pending(2).expect("commit"), 2);
        assert_eq!(reg.pending_len(), 1);

        let first = reg.record(&u64_to_bytes(30)).expect("record");
        assert!(matches!(first.state, RecordState::Committed { leaf_index: 1, .. }));
        let last = reg.record(&u64_to_bytes(20)).expect("record");
        assert_eq!(last.state, RecordState::Pending);
        reg.audit().expect("audit");
    }

    #[test]
    fn test_epoch_lifecycle_and_reclaim() {
        let mut reg = registry();
        let n = u64_to_bytes(42);
        reg.insert(n, 1_001).expect("spend");

        // Pending and too early.
        assert!(matches!(
            reg.advance_epoch(1_050),
            Err(NullifierError::EpochAdvanceTooEarly { .. })
        ));
        reg.commit_pending(10).expect("commit");
        let closed = reg.advance_epoch(1_050).expect("close epoch 0");
        assert_eq!(closed.epoch, 0);
        assert_eq!(closed.committed, 1);
        assert!(reg.is_provable_root(&closed.root));

        // Inserted in epoch 0; cursor still at 0.
        assert!(matches!(
            reg.reclaim(&n),
            Err(NullifierError::NotReclaimable(_))
        ));

        reg.advance_earliest_provable(1).expect("cursor");
        reg.reclaim(&n).expect("reclaim");
        assert_eq!(reg.record_count(), 0);
        assert_eq!(reg.reclaimed_count(), 1);

        // Tree layer still blocks the replay.
        assert!(reg.exists(&n).expect("exists"));
        assert!(reg.insert(n, 2_000).is_err());
    }

    #[test]
    fn test_retained_epoch_blocks_cursor() {
        let mut reg = NullifierRegistry::new(
            RegistryConfig {
                retained_epochs: 1,
                ..config()
            },
            1_000,
        )
        .expect("registry");
        let n = u64_to_bytes(42);
        reg.insert(n, 1_001).expect("spend");
        reg.commit_pending(10).expect("commit");
        let first = reg.advance_epoch(1_002).expect("close epoch 0");

        // Epoch 0 is the newest closed epoch and must stay provable.
        assert!(matches!(
            reg.advance_earliest_provable(1),
            Err(NullifierError::InvalidEpochCursor { latest: 0, .. })
        ));
        assert!(reg.is_provable_root(&first.root));
        assert!(reg.reclaim(&n).is_err());

        reg.advance_epoch(1_003).expect("close epoch 1");
        reg.advance_earliest_provable(1).expect("epoch 0 aged out");
        reg.reclaim(&n).expect("reclaim");
        assert!(reg.covers(&n));
    }

    #[test]
    fn test_pending_never_reclaimed() {
        let mut reg = registry();
        let n = u64_to_bytes(9);
        reg.insert(n, 1_001).expect("spend");
        reg.advance_epoch(1_200).expect("close after interval");
        reg.advance_earliest_provable(1).expect("cursor");
        assert_eq!(reg.reclaim_expired(100), 0);
        assert!(reg.covers(&n));
    }

    #[test]
    fn test_reclaim_expired_bulk() {
        let mut reg = registry();
        for v in 1..=4u64 {
            reg.insert(u64_to_bytes(v), 1_001).expect("spend");
        }
        reg.commit_pending(4).expect("commit");
        reg.advance_epoch(1_002).expect("close");
        reg.advance_earliest_provable(1).expect("cursor");
        assert_eq!(reg.reclaim_expired(3), 3);
        assert_eq!(reg.reclaim_expired(10), 1);
        for v in 1..=4u64 {
            assert!(reg.covers(&u64_to_bytes(v)));
        }
    }

    #[test]
    fn test_reclaim_unknown() {
        let mut reg = registry();
        assert!(matches!(
            reg.reclaim(&u64_to_bytes(1)),
            Err(NullifierError::UnknownNullifier { .. })
        ));
    }

    #[test]
    fn test_witness_refused_for_pending() {
        let mut reg = registry();
        let n = u64_to_bytes(11);
        let witness = reg.non_membership_witness(&n).expect("absent");
        assert!(witness.verify().expect("verify"));
        reg.insert(n, 1_001).expect("spend");
        assert!(reg.non_membership_witness(&n).is_err());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut reg = registry();
        for v in [3, 1, 2] {
            reg.insert(u64_to_bytes(v), 1_001).expect("spend");
        }
        reg.commit_pending(2).expect("commit");
        reg.advance_epoch(1_200).expect("close");

        let snapshot = reg.snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let decoded: RegistrySnapshot = serde_json::from_str(&json).expect("deserialize");
        let restored = NullifierRegistry::restore(config(), decoded).expect("restore");

        assert_eq!(restored.root(), reg.root());
        assert_eq!(restored.pending_len(), 1);
        assert_eq!(restored.current_epoch(), 1);
        for v in [1, 2, 3] {
            assert!(restored.exists(&u64_to_bytes(v)).expect("exists"));
        }
        assert!(!restored.exists(&u64_to_bytes(4)).expect("exists"));
    }

    #[test]
    fn test_restore_rejects_height_mismatch() {
        let reg = registry();
        let mut other = config();
        other.tree_height = 9;
        assert!(NullifierRegistry::restore(other, reg.snapshot()).is_err());
    }
}
