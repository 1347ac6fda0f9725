//! Integration test: pool state survives a save/load cycle through SQLite.
//!
//! 1. Run deposits, withdrawals, an epoch close and an emergency schedule
//! 2. Save the snapshot to an on-disk database and drop the pool
//! 3. Reopen the database, restore the pool and keep operating
//! 4. Spent nullifiers stay spent; pending multipliers still activate on time

use rand::Rng;
use shroud_crypto::field::u64_to_bytes;
use shroud_crypto::groth16::SerializedProof;
use shroud_crypto::note::Note;
use shroud_crypto::Fr;
use shroud_pool::{ErrorClass, PoolConfig, ShieldedPool, TxContext, WithdrawRequest};
use shroud_types::AccountId;
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

fn config() -> PoolConfig {
    let mut config = PoolConfig::with_authority(authority());
    config.economics.base_fee_bps = 10;
    config.economics.min_deposit = 1;
    config.economics.max_deposit = 1_000_000;
    config.economics.hourly_withdrawal_limit = 1_000_000;
    config.vault.minimum_reserve = 1_000;
    config.vault.circuit_breaker_threshold = 0;
    config.note_tree.height = 12;
    config.nullifiers.tree_height = 12;
    config.nullifiers.batch_size = 2;
    config.nullifiers.min_epoch_secs = 60;
    config.nullifiers.filter_bytes = 4096;
    config
}

fn request(pool: &ShieldedPool<BindingOnly>, nullifier: [u8; 32], amount: u64) -> WithdrawRequest {
    let mut request = WithdrawRequest {
        proof: WithdrawalProof {
            artifact_version: 1,
            proof: SerializedProof { bytes: vec![0; 128] },
            public_inputs: Vec::new(),
        },
        root: pool.notes().root(),
        nullifier,
        recipient: AccountId::new([0x42; 32]),
        amount,
        max_fee: 1_000,
    };
    request.proof.public_inputs = request
        .statement()
        .public_input_bytes()
        .expect("public inputs");
    request
}

fn random_note(rng: &mut impl Rng, amount: u64) -> Note {
    Note::new(amount, &Fr::from(rng.gen::<u64>()), &Fr::from(rng.gen::<u64>()))
}

#[test]
fn pool_resumes_from_saved_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("pool.db");
    let cfg = config();
    let mut rng = rand::thread_rng();

    // =========================================================
    // Step 1: Operate a fresh pool
    // =========================================================
    let mut pool = ShieldedPool::new(&cfg, BindingOnly, T0).expect("pool");
    let notes: Vec<Note> = (0..4).map(|_| random_note(&mut rng, 50_000)).collect();
    for note in &notes {
        pool.deposit(&user(T0), 50_000, note.commitment().expect("commitment"))
            .expect("deposit");
    }

    let spent: Vec<[u8; 32]> = notes[..3]
        .iter()
        .map(|n| n.nullifier().expect("nullifier"))
        .collect();
    for nullifier in &spent {
        pool.withdraw(&user(T0 + 10), &request(&pool, *nullifier, 50_000))
            .expect("withdraw");
    }
    // Two spends filled one batch; the third is still pending.
    assert_eq!(pool.nullifiers().pending_len(), 1);

    pool.advance_nullifier_epoch(&user(T0 + 100)).expect("close epoch");
    pool.schedule_emergency_multiplier_change(&admin(T0 + 100), 3, "pre-restart")
        .expect("schedule");
    let expected = pool.snapshot();

    // =========================================================
    // Step 2: Save and drop
    // =========================================================
    {
        let mut conn = shroud_db::open(&db_path).expect("open db");
        shroud_db::save_snapshot(&mut conn, &expected).expect("save");
    }
    drop(pool);

    // =========================================================
    // Step 3: Reopen and restore
    // =========================================================
    let conn = shroud_db::open(&db_path).expect("reopen db");
    let loaded = shroud_db::load_snapshot(&conn)
        .expect("load")
        .expect("snapshot present");
    assert_eq!(
        serde_json::to_value(&loaded).expect("json"),
        serde_json::to_value(&expected).expect("json")
    );
    let mut pool = ShieldedPool::restore(&cfg, loaded, BindingOnly).expect("restore");
    assert_eq!(pool.vault().balance, 50_000);
    assert_eq!(pool.nullifiers().current_epoch(), 1);

    // =========================================================
    // Step 4: Spent nullifiers stay spent, pending or committed
    // =========================================================
    for nullifier in &spent {
        let err = pool
            .withdraw(&user(T0 + 200), &request(&pool, *nullifier, 100))
            .expect_err("replay after restart");
        assert_eq!(err.class(), ErrorClass::DoubleSpend);
    }

    // =========================================================
    // Step 5: Pending multiplier activates on its original schedule
    // =========================================================
    let last = notes[3].nullifier().expect("nullifier");
    let early = pool.quote(10_000, T0 + 200).expect("quote");
    assert_eq!(early.multiplier, 1);
    let receipt = pool
        .withdraw(&user(T0 + 100 + 3_600), &request(&pool, last, 10_000))
        .expect("withdraw after activation");
    assert_eq!(receipt.quote.multiplier, 3);
    assert_eq!(receipt.quote.fee, 30);
    pool.audit().expect("audit");

    // Event numbering continues where it left off.
    let first_new = pool.events().last().map(|r| r.sequence).expect("event");
    assert!(first_new >= expected.next_event_sequence);
}

#[test]
fn restore_rejects_tampered_balances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("pool.db");
    let cfg = config();

    let mut pool = ShieldedPool::new(&cfg, BindingOnly, T0).expect("pool");
    pool.deposit(&user(T0), 20_000, u64_to_bytes(3))
        .expect("deposit");
    let mut conn = shroud_db::open(&db_path).expect("open db");
    shroud_db::save_snapshot(&mut conn, &pool.snapshot()).expect("save");

    conn.execute("UPDATE vault_state SET balance = balance + 1", [])
        .expect("tamper");
    let loaded = shroud_db::load_snapshot(&conn)
        .expect("load")
        .expect("snapshot present");
    assert!(ShieldedPool::restore(&cfg, loaded, BindingOnly).is_err());
}
