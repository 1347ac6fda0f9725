//! Property tests for the two-layer registry.

use std::collections::HashSet;

use proptest::prelude::*;
use shroud_crypto::field::u64_to_bytes;
use shroud_nullifier::{NullifierError, NullifierRegistry, RegistryConfig};

#[derive(Clone, Debug)]
enum Op {
    Spend(u64),
    Commit(usize),
    AdvanceEpoch,
    MoveCursor,
    Reclaim,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1u64..40).prop_map(Op::Spend),
        2 => (1usize..4).prop_map(Op::Commit),
        1 => Just(Op::AdvanceEpoch),
        1 => Just(Op::MoveCursor),
        1 => Just(Op::Reclaim),
    ]
}

fn config() -> RegistryConfig {
    RegistryConfig {
        tree_height: 8,
        batch_size: 4,
        min_epoch_secs: 10,
        filter_bytes: 512,
        filter_hashes: 3,
        retained_epochs: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// No value is ever accepted twice, and every accepted value stays covered
    /// by the records or the tree through commits, epochs and reclamation.
    #[test]
    fn spent_nullifiers_stay_spent(ops in prop::collection::vec(op(), 1..40)) {
        let mut reg = NullifierRegistry::new(config(), 0).expect("registry");
        let mut spent = HashSet::new();
        let mut now = 0u64;

        for op in ops {
            now += 7;
            match op {
                Op::Spend(v) => {
                    let n = u64_to_bytes(v);
                    match reg.insert(n, now) {
                        Ok(_) => prop_assert!(spent.insert(v), "value {} accepted twice", v),
                        Err(NullifierError::NullifierAlreadyUsed { .. }) => {
                            prop_assert!(spent.contains(&v))
                        }
                        Err(e) => prop_assert!(false, "unexpected error {}", e),
                    }
                }
                Op::Commit(max) => {
                    reg.commit_pending(max).expect("commit");
                }
                Op::AdvanceEpoch => {
                    let _ = reg.advance_epoch(now);
                }
                Op::MoveCursor => {
                    let target = reg.current_epoch();
                    reg.advance_earliest_provable(target).expect("cursor");
                }
                Op::Reclaim => {
                    reg.reclaim_expired(usize::MAX);
                }
            }

            for v in &spent {
                prop_assert!(reg.covers(&u64_to_bytes(*v)), "lost nullifier {}", v);
            }
            reg.audit().expect("audit");
        }
    }
}
