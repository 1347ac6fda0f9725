//! Pool operations.
//!
//! Withdrawal checks run in a fixed order, cheapest and least
//! state-dependent first:
//!
//! 1. field and amount checks
//! 2. root is in the accepted history
//! 3. proof binds to the derived public inputs and verifies
//! 4. nullifier is unspent
//! 5. circuit breaker and hourly limit
//! 6. fee against the hard ceiling and the authorised maximum
//! 7. vault reserve
//!
//! Only then are the vault, the accumulators and the nullifier registry
//! updated, from copies staged during the checks. A refusal at steps 5 or 7
//! appends a `WithdrawalRefused` event, and a breaker that latches records
//! its trip; nothing else changes.

use serde::{Deserialize, Serialize};
use shroud_crypto::field::bytes_to_field;
use shroud_guard::{EconomicState, FeeQuote, GuardError, GuardParams, PendingMultiplier, VaultState};
use shroud_nullifier::epoch::ClosedEpoch;
use shroud_nullifier::{NullifierError, NullifierRegistry, RegistrySnapshot};
use shroud_types::events::{BreakerTrigger, EventRecord, PoolEvent};
use shroud_types::{AccountId, Commitment, MerkleRoot, NullifierHash};
use shroud_verifier::{verify_withdrawal, ProofVerifier, WithdrawalProof, WithdrawalStatement};

use crate::config::PoolConfig;
use crate::context::TxContext;
use crate::events::EventJournal;
use crate::note_tree::{NoteTree, NoteTreeSnapshot};
use crate::{PoolError, Result};

/// Arguments of a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub proof: WithdrawalProof,
    pub root: MerkleRoot,
    pub nullifier: NullifierHash,
    pub recipient: AccountId,
    pub amount: u64,
    /// Highest fee the note owner accepts; bound into the proof.
    pub max_fee: u64,
}

impl WithdrawRequest {
    pub fn statement(&self) -> WithdrawalStatement {
        WithdrawalStatement {
            root: self.root,
            nullifier: self.nullifier,
            recipient: self.recipient,
            amount: self.amount,
            max_fee: self.max_fee,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositReceipt {
    pub leaf_index: u64,
    pub root: MerkleRoot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub quote: FeeQuote,
    /// Nullifiers moved into the tree by a batch commit this withdrawal filled.
    pub committed: usize,
}

/// Every state record of a pool, each independently addressable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub params: GuardParams,
    pub economics: EconomicState,
    pub vault: VaultState,
    pub notes: NoteTreeSnapshot,
    pub nullifiers: RegistrySnapshot,
    pub next_event_sequence: u64,
}

/// A shielded pool instance.
pub struct ShieldedPool<V> {
    params: GuardParams,
    economics: EconomicState,
    vault: VaultState,
    notes: NoteTree,
    nullifiers: NullifierRegistry,
    verifier: V,
    events: EventJournal,
}

impl<V: ProofVerifier> ShieldedPool<V> {
    /// Create an empty pool. `now` opens the first nullifier epoch.
    pub fn new(config: &PoolConfig, verifier: V, now: u64) -> Result<Self> {
        config.validate()?;
        let params = config.guard_params();
        let pool = Self {
            economics: EconomicState::new(config.authority()?, params.base_fee_bps)?,
            vault: VaultState::new(params.minimum_vault_reserve, params.circuit_breaker_threshold),
            notes: NoteTree::new(config.note_tree.height, config.note_tree.root_history)?,
            nullifiers: NullifierRegistry::new(config.nullifiers.clone(), now)?,
            verifier,
            events: EventJournal::new(config.events.journal_capacity),
            params,
        };
        tracing::info!(
            authority = %pool.economics.authority,
            note_tree_height = pool.notes.height(),
            nullifier_tree_height = pool.nullifiers.config().tree_height,
            verifier_version = pool.verifier.artifact_version(),
            "shielded pool initialised"
        );
        Ok(pool)
    }

    /// Rebuild a pool from a snapshot and audit it before returning.
    pub fn restore(config: &PoolConfig, snapshot: PoolSnapshot, verifier: V) -> Result<Self> {
        config.validate()?;
        if snapshot.notes.height != config.note_tree.height {
            return Err(PoolError::InvalidConfig(format!(
                "snapshot note tree height {} differs from configured {}",
                snapshot.notes.height, config.note_tree.height
            )));
        }
        let pool = Self {
            params: snapshot.params,
            economics: snapshot.economics,
            vault: snapshot.vault,
            notes: NoteTree::restore(&snapshot.notes)?,
            nullifiers: NullifierRegistry::restore(config.nullifiers.clone(), snapshot.nullifiers)?,
            verifier,
            events: EventJournal::resume(config.events.journal_capacity, snapshot.next_event_sequence),
        };
        pool.audit()?;
        tracing::info!(
            notes = pool.notes.next_index(),
            nullifier_records = pool.nullifiers.record_count(),
            balance = pool.vault.balance,
            "shielded pool restored"
        );
        Ok(pool)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            params: self.params.clone(),
            economics: self.economics.clone(),
            vault: self.vault.clone(),
            notes: self.notes.snapshot(),
            nullifiers: self.nullifiers.snapshot(),
            next_event_sequence: self.events.next_sequence(),
        }
    }

    pub fn params(&self) -> &GuardParams {
        &self.params
    }

    pub fn economics(&self) -> &EconomicState {
        &self.economics
    }

    pub fn vault(&self) -> &VaultState {
        &self.vault
    }

    pub fn notes(&self) -> &NoteTree {
        &self.notes
    }

    pub fn nullifiers(&self) -> &NullifierRegistry {
        &self.nullifiers
    }

    pub fn events(&self) -> &EventJournal {
        &self.events
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// The fee a withdrawal of `amount` would pay at `now`.
    pub fn quote(&self, amount: u64, now: u64) -> Result<FeeQuote> {
        Ok(self
            .economics
            .quote(amount, now)
            .map_err(|e| self.log_arithmetic("quote", amount, e))?)
    }

    // ------------------------------------------------------------------
    // Deposit / withdraw
    // ------------------------------------------------------------------

    /// Record a deposit of `amount` behind `commitment`.
    pub fn deposit(
        &mut self,
        ctx: &TxContext,
        amount: u64,
        commitment: Commitment,
    ) -> Result<DepositReceipt> {
        self.params.check_deposit(amount)?;
        let mut vault = self.vault.clone();
        vault
            .credit_deposit(amount)
            .map_err(|e| self.log_arithmetic("deposit", amount, e))?;

        let (leaf_index, root) = self.notes.append(commitment)?;
        self.vault = vault;

        self.events.emit(
            ctx.timestamp,
            PoolEvent::DepositRecorded {
                commitment,
                leaf_index,
                amount,
                root,
            },
        );
        tracing::debug!(leaf_index, amount, balance = self.vault.balance, "deposit recorded");
        Ok(DepositReceipt { leaf_index, root })
    }

    /// Spend a note.
    ///
    /// # Errors
    ///
    /// Every named failure leaves balances, accumulators and the registry
    /// untouched; see the module docs for the check order.
    pub fn withdraw(&mut self, ctx: &TxContext, request: &WithdrawRequest) -> Result<WithdrawReceipt> {
        let now = ctx.timestamp;
        let amount = request.amount;

        if amount == 0 {
            return Err(GuardError::ZeroWithdrawal.into());
        }
        bytes_to_field(&request.root)?;
        bytes_to_field(&request.nullifier)?;

        if !self.notes.is_known_root(&request.root) {
            tracing::warn!(root = %hex::encode(request.root), "withdrawal against unknown root");
            return Err(PoolError::UnknownRoot {
                root: hex::encode(request.root),
            });
        }

        verify_withdrawal(&self.verifier, &request.proof, &request.statement())?;

        if self.nullifiers.exists(&request.nullifier)? {
            tracing::warn!(nullifier = %hex::encode(request.nullifier), "nullifier replay rejected");
            return Err(NullifierError::NullifierAlreadyUsed {
                nullifier: hex::encode(request.nullifier),
            }
            .into());
        }

        if let Err(e) = self.check_solvency_gates(request, now) {
            self.refuse(request, now, &e);
            return Err(e.into());
        }

        let quote = self.quote(amount, now)?;
        if quote.fee > request.max_fee {
            return Err(PoolError::FeeExceedsAuthorized {
                fee: quote.fee,
                max_fee: request.max_fee,
            });
        }

        if let Err(e) = self.vault.check_reserve(amount) {
            self.refuse(request, now, &e);
            return Err(e.into());
        }

        let mut vault = self.vault.clone();
        vault
            .debit_withdrawal(&quote)
            .map_err(|e| self.log_arithmetic("debit withdrawal", amount, e))?;
        let mut economics = self.economics.clone();
        economics
            .record_withdrawal(&quote, now)
            .map_err(|e| self.log_arithmetic("record withdrawal", amount, e))?;

        self.nullifiers.insert(request.nullifier, now)?;
        self.vault = vault;
        self.economics = economics;

        self.events.emit(
            now,
            PoolEvent::WithdrawCompleted {
                nullifier: request.nullifier,
                recipient: request.recipient,
                amount,
                fee: quote.fee,
                payout: quote.payout,
                effective_rate_bps: quote.effective_rate_bps,
            },
        );
        tracing::debug!(
            amount,
            fee = quote.fee,
            multiplier = quote.multiplier,
            balance = self.vault.balance,
            "withdrawal completed"
        );

        let committed = self.commit_full_batch();
        Ok(WithdrawReceipt { quote, committed })
    }

    /// Breaker and hourly limit. Either may latch the breaker.
    fn check_solvency_gates(&mut self, request: &WithdrawRequest, now: u64) -> std::result::Result<(), GuardError> {
        let balance = self.vault.balance;
        let was_tripped = self.vault.breaker.is_tripped();

        let mut outcome = self.vault.breaker.enforce(balance, now);
        if outcome.is_ok() {
            outcome = self.economics.check_hourly_limit(
                request.amount,
                self.params.hourly_withdrawal_limit,
                now,
            );
            if let Err(GuardError::HourlyLimitExceeded { .. }) = outcome {
                self.vault.breaker.trip(BreakerTrigger::HourlyLimit, now);
            }
        }

        if !was_tripped {
            if let Some(trip) = self.vault.breaker.trip_record() {
                self.events.emit(
                    now,
                    PoolEvent::CircuitBreakerTriggered {
                        trigger: trip.trigger,
                        vault_balance: balance,
                        threshold: self.vault.breaker.threshold(),
                    },
                );
            }
        }
        outcome
    }

    /// Log an overflow with the state it hit. Other errors pass through.
    fn log_arithmetic(&self, operation: &'static str, amount: u64, err: GuardError) -> GuardError {
        if let GuardError::Arithmetic(field) = &err {
            tracing::error!(
                operation,
                field,
                amount,
                balance = self.vault.balance,
                total_volume = self.economics.total_volume,
                "arithmetic overflow"
            );
        }
        err
    }

    fn refuse(&mut self, request: &WithdrawRequest, now: u64, reason: &GuardError) {
        tracing::warn!(amount = request.amount, %reason, "withdrawal refused");
        self.events.emit(
            now,
            PoolEvent::WithdrawalRefused {
                nullifier: request.nullifier,
                amount: request.amount,
                reason: reason.to_string(),
            },
        );
    }

    /// Commit one batch if enough nullifiers are pending. A failure here
    /// does not undo the withdrawal: the pending record still covers it.
    fn commit_full_batch(&mut self) -> usize {
        if !self.nullifiers.batch_ready() {
            return 0;
        }
        let batch = self.nullifiers.config().batch_size;
        match self.nullifiers.commit_pending(batch) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "batch commit failed");
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Enter emergency mode, scheduling `multiplier` behind the fee delay.
    pub fn trigger_emergency_mode(
        &mut self,
        ctx: &TxContext,
        multiplier: u64,
        reason: &str,
    ) -> Result<PendingMultiplier> {
        let pending =
            self.economics
                .trigger_emergency_mode(&ctx.signer, multiplier, reason, ctx.timestamp)?;
        self.events.emit(
            ctx.timestamp,
            PoolEvent::EmergencyModeChanged {
                enabled: true,
                multiplier,
                activation_time: pending.activation_time,
                reason: pending.reason.clone(),
            },
        );
        Ok(pending)
    }

    /// Leave emergency mode; the multiplier drops to 1 at once.
    pub fn disable_emergency_mode(&mut self, ctx: &TxContext) -> Result<()> {
        self.economics.disable_emergency_mode(&ctx.signer)?;
        self.events.emit(
            ctx.timestamp,
            PoolEvent::EmergencyModeChanged {
                enabled: false,
                multiplier: 1,
                activation_time: ctx.timestamp,
                reason: String::new(),
            },
        );
        Ok(())
    }

    pub fn schedule_emergency_multiplier_change(
        &mut self,
        ctx: &TxContext,
        multiplier: u64,
        reason: &str,
    ) -> Result<PendingMultiplier> {
        let previous = self.economics.effective_multiplier(ctx.timestamp);
        let pending = self.economics.schedule_multiplier_change(
            &ctx.signer,
            multiplier,
            reason,
            ctx.timestamp,
        )?;
        self.events.emit(
            ctx.timestamp,
            PoolEvent::EmergencyMultiplierScheduled {
                previous,
                multiplier,
                activation_time: pending.activation_time,
                reason: pending.reason.clone(),
            },
        );
        Ok(pending)
    }

    /// Latch the breaker by hand. Returns `false` if it was already latched.
    pub fn trigger_circuit_breaker(&mut self, ctx: &TxContext) -> Result<bool> {
        self.economics.require_authority(&ctx.signer)?;
        let tripped = self.vault.breaker.trip(BreakerTrigger::Manual, ctx.timestamp);
        if tripped {
            self.events.emit(
                ctx.timestamp,
                PoolEvent::CircuitBreakerTriggered {
                    trigger: BreakerTrigger::Manual,
                    vault_balance: self.vault.balance,
                    threshold: self.vault.breaker.threshold(),
                },
            );
        }
        Ok(tripped)
    }

    /// Clear the breaker latch and the hourly window.
    pub fn reset_circuit_breaker(&mut self, ctx: &TxContext) -> Result<()> {
        self.economics.require_authority(&ctx.signer)?;
        self.vault.breaker.reset();
        self.economics.clear_withdrawal_window();
        self.events.emit(
            ctx.timestamp,
            PoolEvent::CircuitBreakerReset {
                vault_balance: self.vault.balance,
            },
        );
        Ok(())
    }

    /// Move the earliest-provable nullifier epoch forward. Returns the
    /// number of epoch roots dropped.
    pub fn advance_earliest_provable_epoch(&mut self, ctx: &TxContext, epoch: u64) -> Result<usize> {
        self.economics.require_authority(&ctx.signer)?;
        let dropped = self.nullifiers.advance_earliest_provable(epoch)?;
        tracing::info!(epoch, dropped, "earliest provable epoch advanced");
        Ok(dropped)
    }

    pub fn transfer_authority(&mut self, ctx: &TxContext, new_authority: AccountId) -> Result<()> {
        let previous = self
            .economics
            .transfer_authority(&ctx.signer, new_authority)?;
        self.events.emit(
            ctx.timestamp,
            PoolEvent::AuthorityTransferred {
                previous,
                new_authority,
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Move up to `max` pending nullifiers into the indexed tree.
    pub fn commit_pending_nullifiers(&mut self, _ctx: &TxContext, max: usize) -> Result<usize> {
        Ok(self.nullifiers.commit_pending(max)?)
    }

    /// Close the current nullifier epoch.
    pub fn advance_nullifier_epoch(&mut self, ctx: &TxContext) -> Result<ClosedEpoch> {
        let closed = self.nullifiers.advance_epoch(ctx.timestamp)?;
        self.events.emit(
            ctx.timestamp,
            PoolEvent::NullifierEpochAdvanced {
                epoch: closed.epoch,
                earliest_provable_epoch: self.nullifiers.earliest_provable_epoch(),
                root: closed.root,
                committed: closed.committed,
            },
        );
        Ok(closed)
    }

    /// Drop up to `limit` nullifier records the tree now covers.
    pub fn reclaim_nullifiers(&mut self, _ctx: &TxContext, limit: usize) -> usize {
        self.nullifiers.reclaim_expired(limit)
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Check conservation, accumulator agreement and registry structure.
    pub fn audit(&self) -> Result<()> {
        self.vault.check_conservation()?;

        if self.economics.total_fees_collected != self.vault.total_fees_withdrawn {
            return Err(PoolError::Inconsistent(format!(
                "fees collected {} but vault paid {} in fees",
                self.economics.total_fees_collected, self.vault.total_fees_withdrawn
            )));
        }
        let withdrawn = self
            .vault
            .total_paid_out
            .checked_add(self.vault.total_fees_withdrawn)
            .ok_or(GuardError::Arithmetic("withdrawn total"))?;
        if self.economics.total_volume != withdrawn {
            return Err(PoolError::Inconsistent(format!(
                "volume {} but vault released {withdrawn}",
                self.economics.total_volume
            )));
        }
        if self.vault.deposit_count != self.notes.next_index() {
            return Err(PoolError::Inconsistent(format!(
                "{} deposits but {} notes",
                self.vault.deposit_count,
                self.notes.next_index()
            )));
        }

        self.nullifiers.audit()?;
        let spent = self.nullifiers.record_count() as u64 + self.nullifiers.reclaimed_count();
        if spent != self.vault.withdrawal_count {
            return Err(PoolError::Inconsistent(format!(
                "{} withdrawals but {spent} spent nullifiers",
                self.vault.withdrawal_count
            )));
        }
        Ok(())
    }

    /// Events with a sequence number greater than `sequence`.
    pub fn events_since(&self, sequence: u64) -> Vec<EventRecord> {
        self.events.since(sequence).cloned().collect()
    }
}
