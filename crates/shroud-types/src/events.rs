//! Events emitted by the pool program.
//!
//! Every state transition that a client or operator must be able to observe
//! produces exactly one [`PoolEvent`], wrapped in an [`EventRecord`] that
//! carries a sequence number and the transaction timestamp.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{AccountId, Commitment, MerkleRoot, NullifierHash};

/// Envelope for a recorded pool event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// Unix timestamp of the transaction that produced the event.
    pub timestamp: u64,
    pub event: PoolEvent,
}

/// Why the circuit breaker latched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerTrigger {
    /// An authority tripped the breaker explicitly.
    Manual,
    /// Vault balance fell below the breaker threshold.
    ReserveThreshold,
    /// Withdrawals within the rolling hour exceeded the hourly limit.
    HourlyLimit,
}

/// All pool event kinds.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    DepositRecorded {
        #[serde_as(as = "Hex")]
        commitment: Commitment,
        leaf_index: u64,
        amount: u64,
        #[serde_as(as = "Hex")]
        root: MerkleRoot,
    },
    WithdrawCompleted {
        #[serde_as(as = "Hex")]
        nullifier: NullifierHash,
        recipient: AccountId,
        amount: u64,
        fee: u64,
        payout: u64,
        effective_rate_bps: u64,
    },
    /// A withdrawal was refused after passing proof and nullifier checks.
    WithdrawalRefused {
        #[serde_as(as = "Hex")]
        nullifier: NullifierHash,
        amount: u64,
        reason: String,
    },
    EmergencyModeChanged {
        enabled: bool,
        multiplier: u64,
        activation_time: u64,
        reason: String,
    },
    EmergencyMultiplierScheduled {
        previous: u64,
        multiplier: u64,
        activation_time: u64,
        reason: String,
    },
    CircuitBreakerTriggered {
        trigger: BreakerTrigger,
        vault_balance: u64,
        threshold: u64,
    },
    CircuitBreakerReset {
        vault_balance: u64,
    },
    NullifierEpochAdvanced {
        epoch: u64,
        earliest_provable_epoch: u64,
        #[serde_as(as = "Hex")]
        root: MerkleRoot,
        committed: u64,
    },
    AuthorityTransferred {
        previous: AccountId,
        new_authority: AccountId,
    },
}

impl PoolEvent {
    /// Short stable name, used for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::DepositRecorded { .. } => "deposit_recorded",
            PoolEvent::WithdrawCompleted { .. } => "withdraw_completed",
            PoolEvent::WithdrawalRefused { .. } => "withdrawal_refused",
            PoolEvent::EmergencyModeChanged { .. } => "emergency_mode_changed",
            PoolEvent::EmergencyMultiplierScheduled { .. } => "emergency_multiplier_scheduled",
            PoolEvent::CircuitBreakerTriggered { .. } => "circuit_breaker_triggered",
            PoolEvent::CircuitBreakerReset { .. } => "circuit_breaker_reset",
            PoolEvent::NullifierEpochAdvanced { .. } => "nullifier_epoch_advanced",
            PoolEvent::AuthorityTransferred { .. } => "authority_transferred",
        }
    }
}
