//! Custodial vault accounting.
//!
//! The vault tracks the balance backing all unspent notes and the totals
//! that must reconcile with it:
//!
//! ```text
//! balance == total_deposited - total_paid_out - total_fees_withdrawn
//! ```

use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreaker;
use crate::fee::FeeQuote;
use crate::{GuardError, Result};

/// Balance, reserve floor, breaker and running totals of one vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub balance: u64,
    pub minimum_reserve: u64,
    pub breaker: CircuitBreaker,
    pub total_deposited: u64,
    pub total_paid_out: u64,
    pub total_fees_withdrawn: u64,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
}

impl VaultState {
    pub fn new(minimum_reserve: u64, breaker_threshold: u64) -> Self {
        Self {
            balance: 0,
            minimum_reserve,
            breaker: CircuitBreaker::new(breaker_threshold),
            total_deposited: 0,
            total_paid_out: 0,
            total_fees_withdrawn: 0,
            deposit_count: 0,
            withdrawal_count: 0,
        }
    }

    /// Credit a deposit to the vault.
    pub fn credit_deposit(&mut self, amount: u64) -> Result<()> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(GuardError::Arithmetic("vault balance"))?;
        let total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or(GuardError::Arithmetic("total deposited"))?;
        let deposit_count = self
            .deposit_count
            .checked_add(1)
            .ok_or(GuardError::Arithmetic("deposit count"))?;

        self.balance = balance;
        self.total_deposited = total_deposited;
        self.deposit_count = deposit_count;
        Ok(())
    }

    /// Refuse a withdrawal of `amount` that would leave less than the
    /// reserve floor behind.
    pub fn check_reserve(&self, amount: u64) -> Result<()> {
        let refused = || GuardError::InsufficientVaultReserve {
            balance: self.balance,
            amount,
            minimum_reserve: self.minimum_reserve,
        };
        let remaining = self.balance.checked_sub(amount).ok_or_else(refused)?;
        if remaining < self.minimum_reserve {
            return Err(refused());
        }
        Ok(())
    }

    /// Debit a quoted withdrawal. The whole amount leaves the vault: the
    /// payout to the recipient and the fee to the protocol.
    pub fn debit_withdrawal(&mut self, quote: &FeeQuote) -> Result<()> {
        self.check_reserve(quote.amount)?;
        let balance = self
            .balance
            .checked_sub(quote.amount)
            .ok_or(GuardError::Arithmetic("vault balance"))?;
        let total_paid_out = self
            .total_paid_out
            .checked_add(quote.payout)
            .ok_or(GuardError::Arithmetic("total paid out"))?;
        let total_fees_withdrawn = self
            .total_fees_withdrawn
            .checked_add(quote.fee)
            .ok_or(GuardError::Arithmetic("total fees withdrawn"))?;
        let withdrawal_count = self
            .withdrawal_count
            .checked_add(1)
            .ok_or(GuardError::Arithmetic("withdrawal count"))?;

        self.balance = balance;
        self.total_paid_out = total_paid_out;
        self.total_fees_withdrawn = total_fees_withdrawn;
        self.withdrawal_count = withdrawal_count;
        Ok(())
    }

    /// Verify that the balance equals deposits minus everything paid out.
    pub fn check_conservation(&self) -> Result<()> {
        let expected = self
            .total_deposited
            .checked_sub(self.total_paid_out)
            .and_then(|rest| rest.checked_sub(self.total_fees_withdrawn))
            .ok_or(GuardError::ConservationViolated {
                balance: self.balance,
                expected: 0,
            })?;
        if expected != self.balance {
            return Err(GuardError::ConservationViolated {
                balance: self.balance,
                expected,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee;
    use proptest::prelude::*;

    #[test]
    fn test_deposit_then_withdraw() {
        let mut vault = VaultState::new(0, 0);
        vault.credit_deposit(1_000_000).expect("deposit");
        let quote = fee::compute(400_000, 10, 1).expect("quote");
        vault.debit_withdrawal(&quote).expect("withdraw");

        assert_eq!(vault.balance, 600_000);
        assert_eq!(vault.total_paid_out, 399_600);
        assert_eq!(vault.total_fees_withdrawn, 400);
        assert_eq!(vault.withdrawal_count, 1);
        vault.check_conservation().expect("balanced");
    }

    #[test]
    fn test_reserve_floor() {
        let mut vault = VaultState::new(100, 0);
        vault.credit_deposit(1_000).expect("deposit");
        vault.check_reserve(900).expect("leaves exactly the reserve");
        assert!(matches!(
            vault.check_reserve(901),
            Err(GuardError::InsufficientVaultReserve {
                balance: 1_000,
                amount: 901,
                minimum_reserve: 100
            })
        ));
        assert!(matches!(
            vault.check_reserve(5_000),
            Err(GuardError::InsufficientVaultReserve { .. })
        ));
    }

    #[test]
    fn test_refused_debit_leaves_state() {
        let mut vault = VaultState::new(500, 0);
        vault.credit_deposit(1_000).expect("deposit");
        let before = vault.clone();
        let quote = fee::compute(600, 10, 1).expect("quote");
        assert!(vault.debit_withdrawal(&quote).is_err());
        assert_eq!(vault, before);
    }

    #[test]
    fn test_deposit_overflow() {
        let mut vault = VaultState::new(0, 0);
        vault.credit_deposit(u64::MAX).expect("deposit");
        let before = vault.clone();
        assert!(matches!(
            vault.credit_deposit(1),
            Err(GuardError::Arithmetic(_))
        ));
        assert_eq!(vault, before);
    }

    #[test]
    fn test_conservation_violation_detected() {
        let mut vault = VaultState::new(0, 0);
        vault.credit_deposit(1_000).expect("deposit");
        vault.balance = 999;
        assert!(matches!(
            vault.check_conservation(),
            Err(GuardError::ConservationViolated {
                balance: 999,
                expected: 1_000
            })
        ));
    }

    proptest! {
        #[test]
        fn conservation_holds_for_any_sequence(
            ops in prop::collection::vec((any::<bool>(), 1u64..1_000_000_000), 1..64),
            bps in 0u64..=100,
        ) {
            let mut vault = VaultState::new(0, 0);
            for (is_deposit, amount) in ops {
                if is_deposit {
                    vault.credit_deposit(amount).expect("deposit");
                } else if let Ok(quote) = fee::compute(amount, bps, 1) {
                    let _ = vault.debit_withdrawal(&quote);
                }
                prop_assert!(vault.check_conservation().is_ok());
            }
        }
    }
}
