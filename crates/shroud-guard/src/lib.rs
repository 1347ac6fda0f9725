//! # shroud-guard
//!
//! Economic safety rules for the shielded pool.
//!
//! Everything that decides whether value may leave the vault, and how much
//! of it goes to the protocol, lives here. The guard never touches proofs or
//! nullifiers; the pool consults it only after a withdrawal has been proven
//! and found unspent.
//!
//! ## Modules
//!
//! - [`fee`] — Fee quotes with the hard basis-point ceiling
//! - [`multiplier`] — Time-locked emergency multiplier schedule
//! - [`economics`] — Authority-gated economic state and accumulators
//! - [`breaker`] — Latching circuit breaker
//! - [`vault`] — Custodial balance, reserve floor and conservation

pub mod breaker;
pub mod economics;
pub mod fee;
pub mod multiplier;
pub mod vault;

use serde::{Deserialize, Serialize};
use shroud_types::events::BreakerTrigger;
use shroud_types::{AccountId, MAX_FEE_BASIS_POINTS};

pub use breaker::{BreakerTrip, CircuitBreaker};
pub use economics::{EconomicState, WithdrawalWindow};
pub use fee::FeeQuote;
pub use multiplier::{MultiplierSchedule, PendingMultiplier};
pub use vault::VaultState;

/// Length of the rolling withdrawal-limit window, in seconds.
pub const HOURLY_WINDOW_SECONDS: u64 = 3600;

/// Error types for economic guard operations.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Deposit below the configured minimum.
    #[error("deposit too small: {amount} < minimum {min}")]
    DepositTooSmall {
        /// Offered amount.
        amount: u64,
        /// Configured minimum.
        min: u64,
    },

    /// Deposit above the configured maximum.
    #[error("deposit too large: {amount} > maximum {max}")]
    DepositTooLarge {
        /// Offered amount.
        amount: u64,
        /// Configured maximum.
        max: u64,
    },

    /// Withdrawal of nothing.
    #[error("withdrawal amount must be non-zero")]
    ZeroWithdrawal,

    /// Multiplier outside `1..=MAX_EMERGENCY_MULTIPLIER`.
    #[error("invalid emergency multiplier {multiplier}: must be within 1..={max}")]
    InvalidEmergencyMultiplier {
        /// Requested multiplier.
        multiplier: u64,
        /// Largest allowed multiplier.
        max: u64,
    },

    /// Base fee rate above the hard ceiling.
    #[error("invalid base fee rate {bps} bps: must be at most {max}")]
    InvalidFeeRate {
        /// Requested rate.
        bps: u64,
        /// Hard ceiling.
        max: u64,
    },

    /// Signer is not the recorded authority.
    #[error("signer {actual} is not the pool authority {expected}")]
    InvalidAuthority {
        /// Recorded authority.
        expected: AccountId,
        /// Transaction signer.
        actual: AccountId,
    },

    /// Computed fee breaches the basis-point ceiling.
    #[error("fee {fee} exceeds maximum {max_fee} for amount {amount}")]
    FeeExceedsMaximum {
        /// Computed fee.
        fee: u64,
        /// Ceiling for this amount.
        max_fee: u64,
        /// Withdrawal amount.
        amount: u64,
    },

    /// Withdrawal would leave the vault below its reserve floor.
    #[error(
        "insufficient vault reserve: balance {balance}, withdrawal {amount}, reserve {minimum_reserve}"
    )]
    InsufficientVaultReserve {
        /// Current vault balance.
        balance: u64,
        /// Requested withdrawal.
        amount: u64,
        /// Configured reserve floor.
        minimum_reserve: u64,
    },

    /// The circuit breaker is latched.
    #[error("circuit breaker triggered ({trigger:?}): balance {balance}, threshold {threshold}")]
    CircuitBreakerTriggered {
        /// Vault balance when the withdrawal was refused.
        balance: u64,
        /// Breaker threshold.
        threshold: u64,
        /// What latched the breaker.
        trigger: BreakerTrigger,
    },

    /// The rolling hourly withdrawal limit would be exceeded.
    #[error("hourly withdrawal limit exceeded: {window_total} + {amount} > {limit}")]
    HourlyLimitExceeded {
        /// Amount already withdrawn in the current window.
        window_total: u64,
        /// Requested withdrawal.
        amount: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Checked arithmetic failed.
    #[error("arithmetic overflow in {0}")]
    Arithmetic(&'static str),

    /// Vault accounting no longer balances.
    #[error("conservation violated: balance {balance}, expected {expected}")]
    ConservationViolated {
        /// Recorded balance.
        balance: u64,
        /// `deposited - paid_out - fees_withdrawn`.
        expected: u64,
    },

    /// Configuration rejected by validation.
    #[error("invalid guard parameters: {0}")]
    InvalidParams(String),
}

/// Convenience result type for guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Deployment-time economic parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardParams {
    /// Base protocol fee in basis points, before the emergency multiplier.
    pub base_fee_bps: u64,
    /// Smallest accepted deposit.
    pub min_deposit: u64,
    /// Largest accepted deposit. Must not exceed a non-zero hourly limit,
    /// since a note is always withdrawn whole.
    pub max_deposit: u64,
    /// Balance the vault must keep after any withdrawal.
    pub minimum_vault_reserve: u64,
    /// Balance below which the breaker latches.
    pub circuit_breaker_threshold: u64,
    /// Rolling one-hour withdrawal cap. Zero disables the cap.
    pub hourly_withdrawal_limit: u64,
}

impl Default for GuardParams {
    fn default() -> Self {
        Self {
            base_fee_bps: 10,
            min_deposit: 1_000_000,
            max_deposit: 5_000_000_000,
            minimum_vault_reserve: 100_000_000,
            circuit_breaker_threshold: 500_000_000,
            hourly_withdrawal_limit: 5_000_000_000,
        }
    }
}

impl GuardParams {
    /// Reject parameter sets that could never be honoured.
    pub fn validate(&self) -> Result<()> {
        if self.base_fee_bps > MAX_FEE_BASIS_POINTS {
            return Err(GuardError::InvalidFeeRate {
                bps: self.base_fee_bps,
                max: MAX_FEE_BASIS_POINTS,
            });
        }
        if self.min_deposit == 0 {
            return Err(GuardError::InvalidParams(
                "min_deposit must be at least 1".into(),
            ));
        }
        if self.min_deposit > self.max_deposit {
            return Err(GuardError::InvalidParams(format!(
                "min_deposit {} exceeds max_deposit {}",
                self.min_deposit, self.max_deposit
            )));
        }
        if self.hourly_withdrawal_limit != 0 && self.max_deposit > self.hourly_withdrawal_limit {
            return Err(GuardError::InvalidParams(format!(
                "max_deposit {} exceeds hourly_withdrawal_limit {}",
                self.max_deposit, self.hourly_withdrawal_limit
            )));
        }
        Ok(())
    }

    /// Check a deposit amount against the configured bounds.
    pub fn check_deposit(&self, amount: u64) -> Result<()> {
        if amount < self.min_deposit {
            return Err(GuardError::DepositTooSmall {
                amount,
                min: self.min_deposit,
            });
        }
        if amount > self.max_deposit {
            return Err(GuardError::DepositTooLarge {
                amount,
                max: self.max_deposit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_validate() {
        GuardParams::default().validate().expect("defaults are valid");
    }

    #[test]
    fn test_fee_rate_above_ceiling_rejected() {
        let params = GuardParams {
            base_fee_bps: MAX_FEE_BASIS_POINTS + 1,
            ..GuardParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(GuardError::InvalidFeeRate { bps: 101, max: 100 })
        ));
    }

    #[test]
    fn test_inverted_deposit_bounds_rejected() {
        let params = GuardParams {
            min_deposit: 10,
            max_deposit: 5,
            ..GuardParams::default()
        };
        assert!(matches!(params.validate(), Err(GuardError::InvalidParams(_))));
    }

    #[test]
    fn test_deposit_above_hourly_limit_rejected() {
        let params = GuardParams {
            max_deposit: 10_001,
            hourly_withdrawal_limit: 10_000,
            ..GuardParams::default()
        };
        assert!(matches!(params.validate(), Err(GuardError::InvalidParams(_))));

        GuardParams {
            max_deposit: 10_000,
            ..params.clone()
        }
        .validate()
        .expect("max equal to the limit");
        GuardParams {
            hourly_withdrawal_limit: 0,
            ..params
        }
        .validate()
        .expect("no limit, no bound");
    }

    #[test]
    fn test_deposit_bounds() {
        let params = GuardParams::default();
        assert!(matches!(
            params.check_deposit(999_999),
            Err(GuardError::DepositTooSmall { .. })
        ));
        assert!(matches!(
            params.check_deposit(5_000_000_001),
            Err(GuardError::DepositTooLarge { .. })
        ));
        params.check_deposit(1_000_000).expect("min is inclusive");
        params
            .check_deposit(5_000_000_000)
            .expect("max is inclusive");
    }

    #[test]
    fn test_params_partial_toml_shape() {
        let params: GuardParams =
            serde_json::from_str(r#"{"base_fee_bps": 25}"#).expect("deserialize");
        assert_eq!(params.base_fee_bps, 25);
        assert_eq!(params.min_deposit, GuardParams::default().min_deposit);
    }
}
