//! Authority-gated economic state.
//!
//! Holds the fee configuration, the emergency multiplier schedule, the
//! rolling withdrawal window and the protocol-wide accumulators. Every
//! mutation validates first and assigns last, so a failed call leaves the
//! state untouched.

use serde::{Deserialize, Serialize};
use shroud_types::{AccountId, MAX_FEE_BASIS_POINTS};

use crate::fee::{self, FeeQuote};
use crate::multiplier::{validate_multiplier, MultiplierSchedule, PendingMultiplier};
use crate::{GuardError, Result, HOURLY_WINDOW_SECONDS};

/// Withdrawals accounted against the hourly limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalWindow {
    /// Timestamp of the first withdrawal in the current window.
    pub window_start: u64,
    /// Sum of withdrawal amounts since `window_start`.
    pub window_total: u64,
}

impl WithdrawalWindow {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) > HOURLY_WINDOW_SECONDS
    }

    /// Amount already withdrawn in the window that contains `now`.
    pub fn total_at(&self, now: u64) -> u64 {
        if self.is_expired(now) {
            0
        } else {
            self.window_total
        }
    }

    /// Refuse `amount` if it would push the window past `limit`. A zero
    /// limit disables the check.
    pub fn check(&self, amount: u64, limit: u64, now: u64) -> Result<()> {
        if limit == 0 {
            return Ok(());
        }
        let window_total = self.total_at(now);
        let projected = window_total
            .checked_add(amount)
            .ok_or(GuardError::Arithmetic("hourly window total"))?;
        if projected > limit {
            return Err(GuardError::HourlyLimitExceeded {
                window_total,
                amount,
                limit,
            });
        }
        Ok(())
    }

    /// The window after accounting `amount` at `now`.
    pub fn with_withdrawal(&self, amount: u64, now: u64) -> Result<Self> {
        if self.is_expired(now) {
            return Ok(Self {
                window_start: now,
                window_total: amount,
            });
        }
        Ok(Self {
            window_start: self.window_start,
            window_total: self
                .window_total
                .checked_add(amount)
                .ok_or(GuardError::Arithmetic("hourly window total"))?,
        })
    }
}

/// Economic parameters and accumulators of one pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicState {
    pub authority: AccountId,
    pub base_fee_bps: u64,
    pub multiplier: MultiplierSchedule,
    /// Set while emergency mode is on: the timestamp it was enabled.
    pub emergency_since: Option<u64>,
    pub total_fees_collected: u64,
    /// Sum of all withdrawn amounts (fee included).
    pub total_volume: u64,
    pub withdrawal_window: WithdrawalWindow,
}

impl EconomicState {
    pub fn new(authority: AccountId, base_fee_bps: u64) -> Result<Self> {
        if base_fee_bps > MAX_FEE_BASIS_POINTS {
            return Err(GuardError::InvalidFeeRate {
                bps: base_fee_bps,
                max: MAX_FEE_BASIS_POINTS,
            });
        }
        Ok(Self {
            authority,
            base_fee_bps,
            multiplier: MultiplierSchedule::default(),
            emergency_since: None,
            total_fees_collected: 0,
            total_volume: 0,
            withdrawal_window: WithdrawalWindow::default(),
        })
    }

    /// Fail unless `signer` is the recorded authority.
    pub fn require_authority(&self, signer: &AccountId) -> Result<()> {
        if *signer != self.authority {
            return Err(GuardError::InvalidAuthority {
                expected: self.authority,
                actual: *signer,
            });
        }
        Ok(())
    }

    pub fn is_emergency_active(&self) -> bool {
        self.emergency_since.is_some()
    }

    /// Multiplier that applies to a fee computed at `now`.
    pub fn effective_multiplier(&self, now: u64) -> u64 {
        self.multiplier.effective_at(now)
    }

    /// Fee quote for `amount` at `now`.
    pub fn quote(&self, amount: u64, now: u64) -> Result<FeeQuote> {
        fee::compute(amount, self.base_fee_bps, self.effective_multiplier(now))
    }

    /// Schedule a multiplier change without touching the emergency flag.
    pub fn schedule_multiplier_change(
        &mut self,
        signer: &AccountId,
        multiplier: u64,
        reason: &str,
        now: u64,
    ) -> Result<PendingMultiplier> {
        self.require_authority(signer)?;
        let pending = self.multiplier.schedule(multiplier, reason, now)?;
        tracing::info!(
            multiplier,
            activation_time = pending.activation_time,
            reason,
            "emergency multiplier change scheduled"
        );
        Ok(pending)
    }

    /// Enter emergency mode and schedule `multiplier` behind the usual delay.
    pub fn trigger_emergency_mode(
        &mut self,
        signer: &AccountId,
        multiplier: u64,
        reason: &str,
        now: u64,
    ) -> Result<PendingMultiplier> {
        self.require_authority(signer)?;
        validate_multiplier(multiplier)?;
        let pending = self.multiplier.schedule(multiplier, reason, now)?;
        if self.emergency_since.is_none() {
            self.emergency_since = Some(now);
        }
        tracing::info!(
            multiplier,
            activation_time = pending.activation_time,
            reason,
            "emergency mode enabled"
        );
        Ok(pending)
    }

    /// Leave emergency mode. The multiplier returns to 1 immediately.
    pub fn disable_emergency_mode(&mut self, signer: &AccountId) -> Result<()> {
        self.require_authority(signer)?;
        self.multiplier.reset();
        self.emergency_since = None;
        tracing::info!("emergency mode disabled");
        Ok(())
    }

    /// Hand the authority to `new_authority`, returning the previous one.
    pub fn transfer_authority(
        &mut self,
        signer: &AccountId,
        new_authority: AccountId,
    ) -> Result<AccountId> {
        self.require_authority(signer)?;
        let previous = std::mem::replace(&mut self.authority, new_authority);
        tracing::info!(%previous, new = %new_authority, "authority transferred");
        Ok(previous)
    }

    /// Check `amount` against the rolling hourly limit.
    pub fn check_hourly_limit(&self, amount: u64, limit: u64, now: u64) -> Result<()> {
        self.withdrawal_window.check(amount, limit, now)
    }

    /// Account a completed withdrawal.
    pub fn record_withdrawal(&mut self, quote: &FeeQuote, now: u64) -> Result<()> {
        let total_fees_collected = self
            .total_fees_collected
            .checked_add(quote.fee)
            .ok_or(GuardError::Arithmetic("total fees collected"))?;
        let total_volume = self
            .total_volume
            .checked_add(quote.amount)
            .ok_or(GuardError::Arithmetic("total volume"))?;
        let withdrawal_window = self.withdrawal_window.with_withdrawal(quote.amount, now)?;

        self.total_fees_collected = total_fees_collected;
        self.total_volume = total_volume;
        self.withdrawal_window = withdrawal_window;
        self.multiplier.materialize(now);
        Ok(())
    }

    /// Clear the hourly window, as done when the breaker is reset.
    pub fn clear_withdrawal_window(&mut self) {
        self.withdrawal_window = WithdrawalWindow::default();
    }
}
