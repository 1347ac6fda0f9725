//! Latching circuit breaker for withdrawals.
//!
//! Once tripped, the breaker stays tripped until an authority resets it,
//! even if the vault balance recovers in the meantime.

use serde::{Deserialize, Serialize};
use shroud_types::events::BreakerTrigger;

use crate::{GuardError, Result};

/// Record of why and when the breaker latched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerTrip {
    pub trigger: BreakerTrigger,
    pub tripped_at: u64,
}

/// Circuit breaker keyed on the vault balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// Balance below which the breaker latches.
    threshold: u64,
    trip: Option<BreakerTrip>,
}

impl CircuitBreaker {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            trip: None,
        }
    }

    /// Rebuild a breaker from persisted parts.
    pub fn from_parts(threshold: u64, trip: Option<BreakerTrip>) -> Self {
        Self { threshold, trip }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn is_tripped(&self) -> bool {
        self.trip.is_some()
    }

    pub fn trip_record(&self) -> Option<BreakerTrip> {
        self.trip
    }

    /// Latch the breaker. Returns `false` if it was already latched, in which
    /// case the original trip record is kept.
    pub fn trip(&mut self, trigger: BreakerTrigger, now: u64) -> bool {
        if self.trip.is_some() {
            return false;
        }
        tracing::warn!(?trigger, threshold = self.threshold, "circuit breaker tripped");
        self.trip = Some(BreakerTrip {
            trigger,
            tripped_at: now,
        });
        true
    }

    /// Clear the latch, returning the trip it replaced.
    pub fn reset(&mut self) -> Option<BreakerTrip> {
        let previous = self.trip.take();
        if previous.is_some() {
            tracing::info!("circuit breaker reset");
        }
        previous
    }

    /// Refuse if latched, or latch and refuse if `balance` is below the
    /// threshold.
    ///
    /// # Errors
    ///
    /// - [`GuardError::CircuitBreakerTriggered`] in both cases; when this
    ///   call latched the breaker, [`is_tripped`](Self::is_tripped) becomes
    ///   `true` as a side effect.
    pub fn enforce(&mut self, balance: u64, now: u64) -> Result<()> {
        if balance < self.threshold {
            self.trip(BreakerTrigger::ReserveThreshold, now);
        }
        match self.trip {
            Some(trip) => Err(GuardError::CircuitBreakerTriggered {
                balance,
                threshold: self.threshold,
                trigger: trip.trigger,
            }),
            None => Ok(()),
        }
    }
}
