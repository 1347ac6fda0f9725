//! Integration test crate for the shielded pool.
//!
//! This crate has no library code. It only contains integration tests
//! that exercise end-to-end flows across the workspace crates: real
//! Groth16 withdrawals, economic scenarios and persistence.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p shroud-integration-tests
//! ```
