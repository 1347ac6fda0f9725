//! Fee quotes.
//!
//! `fee = floor(amount * base_fee_bps * multiplier / 10_000)`, refused if it
//! exceeds `floor(amount * MAX_FEE_BASIS_POINTS / 10_000)`. All arithmetic is
//! checked; overflow is an error, never a wrap.

use serde::{Deserialize, Serialize};
use shroud_types::{BPS_DENOMINATOR, MAX_FEE_BASIS_POINTS};

use crate::{GuardError, Result};

/// The fee outcome for one withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub amount: u64,
    pub base_rate_bps: u64,
    pub multiplier: u64,
    /// `base_rate_bps * multiplier`.
    pub effective_rate_bps: u64,
    pub fee: u64,
    /// `amount - fee`, what the recipient receives.
    pub payout: u64,
}

/// Largest fee the protocol may take on `amount`.
pub fn max_fee_for(amount: u64) -> Result<u64> {
    amount
        .checked_mul(MAX_FEE_BASIS_POINTS)
        .map(|scaled| scaled / BPS_DENOMINATOR)
        .ok_or(GuardError::Arithmetic("max fee"))
}

/// Quote the fee for `amount` at `base_rate_bps` scaled by `multiplier`.
pub fn compute(amount: u64, base_rate_bps: u64, multiplier: u64) -> Result<FeeQuote> {
    let effective_rate_bps = base_rate_bps
        .checked_mul(multiplier)
        .ok_or(GuardError::Arithmetic("effective fee rate"))?;
    let fee = amount
        .checked_mul(effective_rate_bps)
        .map(|scaled| scaled / BPS_DENOMINATOR)
        .ok_or(GuardError::Arithmetic("fee"))?;

    let max_fee = max_fee_for(amount)?;
    if fee > max_fee {
        return Err(GuardError::FeeExceedsMaximum {
            fee,
            max_fee,
            amount,
        });
    }

    let payout = amount
        .checked_sub(fee)
        .ok_or(GuardError::Arithmetic("payout"))?;

    Ok(FeeQuote {
        amount,
        base_rate_bps,
        multiplier,
        effective_rate_bps,
        fee,
        payout,
    })
}
