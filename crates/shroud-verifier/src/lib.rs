//! # shroud-verifier
//!
//! Withdrawal proof verification.
//!
//! The pool never trusts the public inputs carried by a proof. It derives
//! them from the withdrawal arguments, requires the carried copy to match
//! element by element, and verifies against the derived vector only.
//!
//! ## Modules
//!
//! - [`statement`] — Public input derivation and the withdrawal proof envelope
//! - [`artifact`] — Versioned circuit artifact carrying the verifying key
//! - [`groth16`] — The [`ProofVerifier`] seam and its Groth16 implementation
//! - `fixture` — Reference withdrawal circuit (feature `fixture-circuit`)

pub mod artifact;
#[cfg(feature = "fixture-circuit")]
pub mod fixture;
pub mod groth16;
pub mod statement;

use shroud_crypto::CryptoError;

pub use artifact::CircuitArtifact;
pub use groth16::{verify_withdrawal, Groth16Verifier, ProofVerifier};
pub use statement::{WithdrawalProof, WithdrawalStatement, PUBLIC_INPUT_COUNT, PUBLIC_INPUT_NAMES};

/// Error types for proof verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// A statement field is not a canonical field element.
    #[error("public input {name} is not a canonical field element")]
    NonCanonicalInput {
        /// Name of the offending input.
        name: &'static str,
    },

    /// The proof carries the wrong number of public inputs.
    #[error("public input count mismatch: expected {expected}, got {actual}")]
    PublicInputCountMismatch {
        /// Inputs the circuit takes.
        expected: usize,
        /// Inputs the proof carries.
        actual: usize,
    },

    /// A carried public input differs from the derived one.
    #[error("public input {index} ({name}) does not match the withdrawal arguments")]
    PublicInputMismatch {
        /// Position in the public input vector.
        index: usize,
        /// Name of the input at that position.
        name: &'static str,
    },

    /// The proof was generated for a different circuit artifact.
    #[error("artifact version mismatch: verifier has {expected}, proof claims {actual}")]
    ArtifactVersionMismatch {
        /// Version of the loaded artifact.
        expected: u32,
        /// Version claimed by the proof.
        actual: u32,
    },

    /// The artifact blob is malformed or does not fit the withdrawal circuit.
    #[error("invalid circuit artifact: {0}")]
    InvalidArtifact(String),

    /// The pairing check failed.
    #[error("invalid proof")]
    InvalidProof,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Convenience result type for verification.
pub type Result<T> = std::result::Result<T, VerifierError>;
