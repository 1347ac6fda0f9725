//! Time-locked emergency multiplier.
//!
//! Increases only take effect `FEE_CHANGE_DELAY_SECONDS` after they are
//! scheduled. The pending record is resolved lazily: readers compare the
//! activation time with their own clock, and the next mutation folds an
//! activated record into the active value.

use serde::{Deserialize, Serialize};
use shroud_types::{FEE_CHANGE_DELAY_SECONDS, MAX_EMERGENCY_MULTIPLIER};

use crate::{GuardError, Result};

/// A scheduled multiplier change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMultiplier {
    pub multiplier: u64,
    /// Earliest timestamp at which the change applies.
    pub activation_time: u64,
    pub reason: String,
}

/// Active multiplier plus at most one pending change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierSchedule {
    active: u64,
    pending: Option<PendingMultiplier>,
}

impl Default for MultiplierSchedule {
    fn default() -> Self {
        Self {
            active: 1,
            pending: None,
        }
    }
}

/// Reject multipliers outside `1..=MAX_EMERGENCY_MULTIPLIER`.
pub fn validate_multiplier(multiplier: u64) -> Result<()> {
    if multiplier == 0 || multiplier > MAX_EMERGENCY_MULTIPLIER {
        return Err(GuardError::InvalidEmergencyMultiplier {
            multiplier,
            max: MAX_EMERGENCY_MULTIPLIER,
        });
    }
    Ok(())
}

impl MultiplierSchedule {
    /// Rebuild a schedule from persisted parts.
    pub fn from_parts(active: u64, pending: Option<PendingMultiplier>) -> Result<Self> {
        validate_multiplier(active)?;
        if let Some(p) = &pending {
            validate_multiplier(p.multiplier)?;
        }
        Ok(Self { active, pending })
    }

    /// The multiplier in force at `now`.
    pub fn effective_at(&self, now: u64) -> u64 {
        match &self.pending {
            Some(p) if now >= p.activation_time => p.multiplier,
            _ => self.active,
        }
    }

    /// The last materialised multiplier, ignoring any pending change.
    pub fn active(&self) -> u64 {
        self.active
    }

    pub fn pending(&self) -> Option<&PendingMultiplier> {
        self.pending.as_ref()
    }

    /// Fold an activated pending change into the active value.
    ///
    /// Returns `true` if a change was applied.
    pub fn materialize(&mut self, now: u64) -> bool {
        match self.pending.take() {
            Some(p) if now >= p.activation_time => {
                self.active = p.multiplier;
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// Schedule `multiplier` to apply one delay period after `now`.
    ///
    /// Replaces any change that has not activated yet.
    pub fn schedule(
        &mut self,
        multiplier: u64,
        reason: impl Into<String>,
        now: u64,
    ) -> Result<PendingMultiplier> {
        validate_multiplier(multiplier)?;
        let activation_time = now
            .checked_add(FEE_CHANGE_DELAY_SECONDS)
            .ok_or(GuardError::Arithmetic("multiplier activation time"))?;

        self.materialize(now);
        let pending = PendingMultiplier {
            multiplier,
            activation_time,
            reason: reason.into(),
        };
        self.pending = Some(pending.clone());
        Ok(pending)
    }

    /// Drop any pending change and return to multiplier 1 immediately.
    pub fn reset(&mut self) {
        self.active = 1;
        self.pending = None;
    }
}
