//! Integration test: economic guard scenarios through the pool.
//!
//! Covers the delayed emergency multiplier, the latched circuit breaker,
//! the hourly limit and value conservation over random operation sequences.
//! Proof checking is replaced by a verifier that accepts any proof whose
//! carried public inputs match the withdrawal arguments, so these tests
//! focus on the guard.

use proptest::prelude::*;
use shroud_crypto::field::u64_to_bytes;
use shroud_crypto::groth16::SerializedProof;
use shroud_crypto::Fr;
use shroud_guard::GuardError;
use shroud_pool::{ErrorClass, PoolConfig, PoolError, ShieldedPool, TxContext, WithdrawRequest};
use shroud_types::events::{BreakerTrigger, PoolEvent};
use shroud_types::{AccountId, FEE_CHANGE_DELAY_SECONDS, MAX_FEE_BASIS_POINTS};
use shroud_verifier::{ProofVerifier, WithdrawalProof};

const T0: u64 = 1_700_000_000;

struct BindingOnly;

impl ProofVerifier for BindingOnly {
    fn artifact_version(&self) -> u32 {
        1
    }

    fn verification_key_hash(&self) -> [u8; 32] {
        [0u8; 32]
    }

    fn verify(&self, _proof: &SerializedProof, _inputs: &[Fr]) -> shroud_verifier::Result<bool> {
        Ok(true)
    }
}

fn authority() -> AccountId {
    AccountId::new([0xA0; 32])
}

fn admin(at: u64) -> TxContext {
    TxContext::new(authority(), at)
}

fn user(at: u64) -> TxContext {
    TxContext::new(AccountId::new([0x07; 32]), at)
}

fn config(base_fee_bps: u64) -> PoolConfig {
    let mut config = PoolConfig::with_authority(authority());
    config.economics.base_fee_bps = base_fee_bps;
    config.economics.min_deposit = 1;
    config.economics.hourly_withdrawal_limit = 0;
    config.vault.minimum_reserve = 0;
    config.vault.circuit_breaker_threshold = 0;
    config.note_tree.height = 12;
    config.nullifiers.tree_height = 12;
    config.nullifiers.batch_size = 8;
    config.nullifiers.filter_bytes = 4096;
    config.nullifiers.retained_epochs = 0;
    config
}

fn request(
    pool: &ShieldedPool<BindingOnly>,
    nullifier: u64,
    amount: u64,
    max_fee: u64,
) -> WithdrawRequest {
    let mut request = WithdrawRequest {
        proof: WithdrawalProof {
            artifact_version: 1,
            proof: SerializedProof { bytes: vec![0; 128] },
            public_inputs: Vec::new(),
        },
        root: pool.notes().root(),
        nullifier: u64_to_bytes(nullifier),
        recipient: AccountId::new([0x42; 32]),
        amount,
        max_fee,
    };
    request.proof.public_inputs = request
        .statement()
        .public_input_bytes()
        .expect("public inputs");
    request
}

#[test]
fn multiplier_change_waits_for_the_delay() {
    let mut pool = ShieldedPool::new(&config(10), BindingOnly, T0).expect("pool");
    pool.deposit(&user(T0), 100_000_000, u64_to_bytes(1))
        .expect("deposit");

    // =========================================================
    // Step 1: Schedule multiplier 5 at t
    // =========================================================
    let pending = pool
        .schedule_emergency_multiplier_change(&admin(T0), 5, "liquidity stress")
        .expect("schedule");
    assert_eq!(pending.activation_time, T0 + FEE_CHANGE_DELAY_SECONDS);
    assert!(matches!(
        pool.events().last().map(|r| &r.event),
        Some(PoolEvent::EmergencyMultiplierScheduled {
            previous: 1,
            multiplier: 5,
            ..
        })
    ));

    // =========================================================
    // Step 2: t + 1800 still pays the old rate
    // =========================================================
    let early = pool
        .withdraw(&user(T0 + 1800), &request(&pool, 11, 1_000_000, 10_000))
        .expect("early withdrawal");
    assert_eq!(early.quote.multiplier, 1);
    assert_eq!(early.quote.effective_rate_bps, 10);
    assert_eq!(early.quote.fee, 1_000);

    // =========================================================
    // Step 3: t + 3601 pays the new rate
    // =========================================================
    let late = pool
        .withdraw(&user(T0 + 3601), &request(&pool, 12, 1_000_000, 10_000))
        .expect("late withdrawal");
    assert_eq!(late.quote.multiplier, 5);
    assert_eq!(late.quote.effective_rate_bps, 50);
    assert_eq!(late.quote.fee, 5_000);

    assert_eq!(pool.economics().total_fees_collected, 6_000);
    pool.audit().expect("audit");
}

#[test]
fn fee_ceiling_holds_under_maximum_multiplier() {
    let mut pool = ShieldedPool::new(&config(50), BindingOnly, T0).expect("pool");
    pool.deposit(&user(T0), 10_000_000, u64_to_bytes(1))
        .expect("deposit");
    pool.trigger_emergency_mode(&admin(T0), 10, "drain")
        .expect("emergency");

    // 50 bps * 10 = 500 bps, above the 100 bps ceiling.
    let err = pool
        .withdraw(&user(T0 + 3600), &request(&pool, 5, 1_000_000, u64::MAX))
        .expect_err("ceiling");
    assert!(matches!(
        err,
        PoolError::Guard(GuardError::FeeExceedsMaximum { .. })
    ));
    assert_eq!(pool.vault().balance, 10_000_000);

    // Leaving emergency mode restores the base rate immediately.
    pool.disable_emergency_mode(&admin(T0 + 3601))
        .expect("disable");
    let receipt = pool
        .withdraw(&user(T0 + 3602), &request(&pool, 5, 1_000_000, 5_000))
        .expect("base rate");
    assert_eq!(receipt.quote.fee, 5_000);
}

#[test]
fn breaker_latches_until_reset() {
    let mut cfg = config(10);
    cfg.vault.circuit_breaker_threshold = 5_000;
    let mut pool = ShieldedPool::new(&cfg, BindingOnly, T0).expect("pool");
    pool.deposit(&user(T0), 6_000, u64_to_bytes(1)).expect("deposit");

    // =========================================================
    // Step 1: Withdrawal drops the balance below the threshold
    // =========================================================
    pool.withdraw(&user(T0 + 1), &request(&pool, 21, 2_000, 10))
        .expect("first withdrawal");
    assert_eq!(pool.vault().balance, 4_000);

    // =========================================================
    // Step 2: Next withdrawal latches the breaker
    // =========================================================
    let err = pool
        .withdraw(&user(T0 + 2), &request(&pool, 22, 100, 10))
        .expect_err("breaker");
    assert_eq!(err.class(), ErrorClass::Solvency);
    assert!(err.is_retryable());
    assert_eq!(
        pool.vault().breaker.trip_record().map(|t| t.trigger),
        Some(BreakerTrigger::ReserveThreshold)
    );

    // =========================================================
    // Step 3: Deposits stay open; the latch holds after recovery
    // =========================================================
    pool.deposit(&user(T0 + 3), 50_000, u64_to_bytes(2))
        .expect("deposit while latched");
    assert!(pool
        .withdraw(&user(T0 + 4), &request(&pool, 22, 100, 10))
        .is_err());

    // =========================================================
    // Step 4: Only the authority may reset
    // =========================================================
    assert!(pool.reset_circuit_breaker(&user(T0 + 5)).is_err());
    pool.reset_circuit_breaker(&admin(T0 + 5)).expect("reset");
    pool.withdraw(&user(T0 + 6), &request(&pool, 22, 100, 10))
        .expect("after reset");

    let kinds: Vec<&str> = pool.events().iter().map(|r| r.event.kind()).collect();
    assert!(kinds.contains(&"circuit_breaker_triggered"));
    assert!(kinds.contains(&"withdrawal_refused"));
    assert!(kinds.contains(&"circuit_breaker_reset"));
    pool.audit().expect("audit");
}

#[test]
fn hourly_limit_window_rolls_over() {
    let mut cfg = config(10);
    cfg.economics.hourly_withdrawal_limit = 10_000;
    cfg.economics.max_deposit = 10_000;
    let mut pool = ShieldedPool::new(&cfg, BindingOnly, T0).expect("pool");
    for commitment in 1..=2 {
        pool.deposit(&user(T0), 10_000, u64_to_bytes(commitment))
            .expect("deposit");
    }

    pool.withdraw(&user(T0), &request(&pool, 31, 6_000, 100))
        .expect("first");
    pool.withdraw(&user(T0 + 1_000), &request(&pool, 32, 4_000, 100))
        .expect("exactly at the limit");

    let err = pool
        .withdraw(&user(T0 + 2_000), &request(&pool, 33, 1, 100))
        .expect_err("over the limit");
    assert!(matches!(
        err,
        PoolError::Guard(GuardError::HourlyLimitExceeded { limit: 10_000, .. })
    ));
    assert_eq!(
        pool.vault().breaker.trip_record().map(|t| t.trigger),
        Some(BreakerTrigger::HourlyLimit)
    );

    // A new hour does not clear the latch; the authority does.
    assert!(pool
        .withdraw(&user(T0 + 7_200), &request(&pool, 33, 1, 100))
        .is_err());
    pool.reset_circuit_breaker(&admin(T0 + 7_200)).expect("reset");
    pool.withdraw(&user(T0 + 7_201), &request(&pool, 33, 6_000, 100))
        .expect("fresh window");
}

#[derive(Clone, Debug)]
enum Op {
    Deposit(u64),
    Withdraw { nullifier: u64, amount: u64 },
    Replay,
    Emergency(u64),
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..=1_000_000).prop_map(Op::Deposit),
        (1u64..=40, 1u64..=500_000).prop_map(|(nullifier, amount)| Op::Withdraw { nullifier, amount }),
        Just(Op::Replay),
        (1u64..=10).prop_map(Op::Emergency),
        (1u64..=4_000).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn value_is_conserved_and_nullifiers_spend_once(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let mut cfg = config(20);
        cfg.vault.minimum_reserve = 10_000;
        let mut pool = ShieldedPool::new(&cfg, BindingOnly, T0).expect("pool");
        let mut now = T0;
        let mut spent: Vec<u64> = Vec::new();
        let mut commitment = 1u64;

        for op in ops {
            match op {
                Op::Deposit(amount) => {
                    commitment += 1;
                    pool.deposit(&user(now), amount, u64_to_bytes(commitment))
                        .expect("deposit within bounds");
                }
                Op::Withdraw { nullifier, amount } => {
                    let req = request(&pool, nullifier, amount, u64::MAX);
                    let before = pool.vault().clone();
                    match pool.withdraw(&user(now), &req) {
                        Ok(receipt) => {
                            prop_assert!(!spent.contains(&nullifier));
                            prop_assert!(
                                receipt.quote.fee * 10_000 <= amount * MAX_FEE_BASIS_POINTS
                            );
                            prop_assert_eq!(receipt.quote.fee + receipt.quote.payout, amount);
                            prop_assert!(pool.vault().balance >= cfg.vault.minimum_reserve);
                            spent.push(nullifier);
                        }
                        Err(e) => {
                            prop_assert_eq!(pool.vault().balance, before.balance);
                            prop_assert_eq!(pool.vault().total_paid_out, before.total_paid_out);
                            if spent.contains(&nullifier) {
                                prop_assert_eq!(e.class(), ErrorClass::DoubleSpend);
                            }
                        }
                    }
                }
                Op::Replay => {
                    if let Some(&nullifier) = spent.first() {
                        let req = request(&pool, nullifier, 1, u64::MAX);
                        let err = pool.withdraw(&user(now), &req).expect_err("replay");
                        prop_assert_eq!(err.class(), ErrorClass::DoubleSpend);
                    }
                }
                Op::Emergency(multiplier) => {
                    pool.trigger_emergency_mode(&admin(now), multiplier, "test")
                        .expect("valid multiplier");
                }
                Op::Advance(secs) => {
                    now += secs;
                    if pool.advance_nullifier_epoch(&user(now)).is_ok() {
                        let epoch = pool.nullifiers().current_epoch();
                        pool.advance_earliest_provable_epoch(&admin(now), epoch)
                            .expect("cursor");
                        pool.reclaim_nullifiers(&user(now), 100);
                    }
                }
            }
            pool.audit().expect("audit after every operation");
        }
    }
}
