//! # shroud-crypto
//!
//! Cryptographic primitives for the Shroud shielded pool.
//!
//! The Poseidon hash exists in three independent implementations that must
//! agree bit for bit: the native hasher used by the pool program, the
//! portable sponge used by client-side provers, and the R1CS gadget used
//! inside withdrawal circuits. All three are checked against the shared
//! vector file `test-vectors/poseidon_bn254.json`.
//!
//! ## Modules
//!
//! - [`field`] — Canonical 32-byte big-endian BN254 scalar encoding
//! - [`poseidon`] — Native Poseidon (circom parameters, BN254, x^5)
//! - [`sponge`] — Portable Poseidon permutation for client libraries
//! - [`gadget`] — Poseidon R1CS gadget for proof circuits
//! - [`groth16`] — Groth16/BN254 setup, proving and verification
//! - [`note`] — Note commitment and nullifier derivation
//! - [`blake3`] — Domain-separated BLAKE3 for non-circuit digests

pub mod blake3;
pub mod field;
pub mod gadget;
pub mod groth16;
pub mod note;
pub mod poseidon;
pub mod sponge;

pub use ark_bn254::Fr;

/// Version of the Poseidon parameter set. Any change to round constants,
/// MDS matrices or round counts must bump this value, and proofs generated
/// under a different version are refused.
pub const HASH_VERSION: u32 = 1;

/// Human-readable name of the parameter set behind [`HASH_VERSION`].
pub const HASH_PARAMETER_SET: &str = "poseidon-bn254-x5-circom";

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A 32-byte encoding is not the canonical encoding of a field element.
    #[error("non-canonical field element: 0x{0}")]
    InvalidFieldElement(String),

    /// Poseidon called with an unsupported number of inputs.
    #[error("unsupported poseidon arity {arity}: expected 1..={max}")]
    InvalidArity { arity: usize, max: usize },

    /// The underlying Poseidon implementation rejected its input.
    #[error("poseidon error: {0}")]
    Poseidon(String),

    /// Groth16 proof generation or verification failed.
    #[error("proof error: {0}")]
    Proof(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
