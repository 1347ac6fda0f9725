//! # shroud-pool
//!
//! The shielded pool program: deposits append commitments to the note tree,
//! withdrawals prove membership of a note, reveal its nullifier and pass the
//! economic guard before value leaves the vault.
//!
//! Each operation is a `&mut self` call on [`ShieldedPool`]. It either
//! commits completely or returns an error having changed nothing, so the
//! environment only needs to serialise calls.
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration
//! - [`context`] — Transaction signer and timestamp
//! - [`events`] — Bounded event journal
//! - [`note_tree`] — Append-only commitment tree with root history
//! - [`pool`] — Pool operations, audit and snapshots

pub mod config;
pub mod context;
pub mod events;
pub mod note_tree;
pub mod pool;

use shroud_crypto::CryptoError;
use shroud_guard::GuardError;
use shroud_nullifier::NullifierError;
use shroud_verifier::VerifierError;

pub use config::PoolConfig;
pub use context::TxContext;
pub use note_tree::{NoteTree, NoteTreeSnapshot};
pub use pool::{
    DepositReceipt, PoolSnapshot, ShieldedPool, WithdrawReceipt, WithdrawRequest,
};

/// How a caller should react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, rejected before any mutation. Fix the request.
    Validation,
    /// The note is already spent. Never resubmit the same proof.
    DoubleSpend,
    /// The vault cannot pay right now. Wait for replenishment or a reset.
    Solvency,
    /// The proof does not establish the claimed withdrawal.
    Proof,
    /// A checked operation overflowed.
    Arithmetic,
    /// Corrupted or misconfigured state. Escalate to an operator.
    Internal,
}

/// Error types for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Nullifier(#[from] NullifierError),

    #[error(transparent)]
    Verifier(#[from] VerifierError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The withdrawal references a root outside the accepted history.
    #[error("unknown merkle root 0x{root}")]
    UnknownRoot {
        /// Hex encoding of the root.
        root: String,
    },

    /// The protocol fee is above the ceiling the note owner authorised.
    #[error("fee {fee} exceeds authorised maximum {max_fee}")]
    FeeExceedsAuthorized {
        /// Fee the protocol would take.
        fee: u64,
        /// Ceiling bound into the proof.
        max_fee: u64,
    },

    /// The note tree has no free leaves.
    #[error("note tree is full ({capacity} leaves)")]
    TreeFull {
        /// Leaf capacity.
        capacity: u64,
    },

    /// Malformed argument to a query.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Audit or restore found state that does not add up.
    #[error("inconsistent pool state: {0}")]
    Inconsistent(String),
}

impl PoolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PoolError::Guard(e) => match e {
                GuardError::InsufficientVaultReserve { .. }
                | GuardError::CircuitBreakerTriggered { .. }
                | GuardError::HourlyLimitExceeded { .. } => ErrorClass::Solvency,
                GuardError::Arithmetic(_) => ErrorClass::Arithmetic,
                GuardError::ConservationViolated { .. } => ErrorClass::Internal,
                _ => ErrorClass::Validation,
            },
            PoolError::Nullifier(e) => match e {
                NullifierError::NullifierAlreadyUsed { .. } => ErrorClass::DoubleSpend,
                NullifierError::TreeFull { .. }
                | NullifierError::InvalidConfig(_)
                | NullifierError::Inconsistent(_) => ErrorClass::Internal,
                _ => ErrorClass::Validation,
            },
            PoolError::Verifier(VerifierError::NonCanonicalInput { .. }) => ErrorClass::Validation,
            PoolError::Verifier(VerifierError::InvalidArtifact(_)) => ErrorClass::Internal,
            PoolError::Verifier(_) | PoolError::UnknownRoot { .. } => ErrorClass::Proof,
            PoolError::Crypto(_)
            | PoolError::FeeExceedsAuthorized { .. }
            | PoolError::InvalidArgument(_) => ErrorClass::Validation,
            PoolError::TreeFull { .. }
            | PoolError::InvalidConfig(_)
            | PoolError::Inconsistent(_) => ErrorClass::Internal,
        }
    }

    /// Whether resubmitting the identical request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::Nullifier(NullifierError::EpochAdvanceTooEarly { .. })
                | PoolError::FeeExceedsAuthorized { .. }
        ) || self.class() == ErrorClass::Solvency
    }
}

/// Convenience result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
