//! # shroud-nullifier
//!
//! Double-spend prevention for the shielded pool.
//!
//! A spent note reveals its nullifier. The registry answers "has this
//! nullifier been seen" and records new ones in a single `&mut self` call,
//! so no other operation can observe the gap between the check and the
//! insert.
//!
//! Storage is two-layered. A transient per-nullifier record is created the
//! moment a withdrawal succeeds. Records are later batch-inserted into an
//! indexed Merkle tree (a sorted linked list committed to by a Merkle root),
//! which supports compact non-membership proofs. Once the earliest provable
//! epoch has moved past a record's insertion epoch, the record can be
//! reclaimed because the tree alone proves presence from then on.
//!
//! ## Modules
//!
//! - [`indexed`] — Indexed (sorted linked-list) Merkle tree
//! - [`epoch`] — Epoch ledger and provable-root window
//! - [`bloom`] — Membership prefilter
//! - [`registry`] — Two-layer registry

pub mod bloom;
pub mod epoch;
pub mod indexed;
pub mod registry;

pub use indexed::{IndexedLeaf, IndexedTree, NonMembershipWitness};
pub use registry::{
    NullifierRecord, NullifierRegistry, RecordState, RegistryConfig, RegistrySnapshot,
};

/// Error types for nullifier operations.
#[derive(Debug, thiserror::Error)]
pub enum NullifierError {
    /// The nullifier has already been spent.
    #[error("nullifier already used: 0x{nullifier}")]
    NullifierAlreadyUsed {
        /// Hex encoding of the offending nullifier.
        nullifier: String,
    },

    /// Zero is the genesis sentinel of the indexed tree and cannot be spent.
    #[error("nullifier value zero is reserved")]
    ReservedValue,

    /// The nullifier is not a canonical field element.
    #[error(transparent)]
    Crypto(#[from] shroud_crypto::CryptoError),

    /// The indexed tree has no free leaves.
    #[error("nullifier tree is full ({capacity} leaves)")]
    TreeFull {
        /// Leaf capacity of the tree.
        capacity: u64,
    },

    /// Pending nullifiers exist and the minimum epoch length has not passed.
    #[error("epoch advance too early: {pending} pending, next advance allowed at {allowed_at}")]
    EpochAdvanceTooEarly {
        /// Number of pending nullifiers.
        pending: usize,
        /// Earliest timestamp at which the advance is accepted.
        allowed_at: u64,
    },

    /// The earliest-provable cursor may only move forward, and never past
    /// the retained window of recent closed epochs.
    #[error("invalid provable epoch {requested}: must be within [{earliest}, {latest}]")]
    InvalidEpochCursor {
        /// Requested cursor value.
        requested: u64,
        /// Current cursor value.
        earliest: u64,
        /// Furthest the cursor may move right now.
        latest: u64,
    },

    /// No transient record exists for the nullifier.
    #[error("no record for nullifier 0x{nullifier}")]
    UnknownNullifier {
        /// Hex encoding of the nullifier.
        nullifier: String,
    },

    /// The record is still needed to prove the nullifier is spent.
    #[error("record not reclaimable: {0}")]
    NotReclaimable(String),

    /// Invalid registry parameters.
    #[error("invalid nullifier configuration: {0}")]
    InvalidConfig(String),

    /// Restored state is internally inconsistent.
    #[error("inconsistent nullifier state: {0}")]
    Inconsistent(String),
}

impl NullifierError {
    pub(crate) fn already_used(nullifier: &[u8; 32]) -> Self {
        NullifierError::NullifierAlreadyUsed {
            nullifier: hex::encode(nullifier),
        }
    }
}

/// Convenience result type for nullifier operations.
pub type Result<T> = std::result::Result<T, NullifierError>;
