//! # shroud-types
//!
//! Shared domain types used across the Shroud workspace.
//!
//! Every on-chain value that crosses a crate boundary (commitments,
//! nullifiers, roots, account identities, events) is defined here so that
//! the crypto, registry, guard and pool crates agree on one representation.

pub mod account;
pub mod events;

pub use account::AccountId;

/// A canonical 32-byte big-endian encoding of a BN254 scalar field element.
pub type FieldBytes = [u8; 32];

/// A note commitment (tree leaf).
pub type Commitment = FieldBytes;

/// A nullifier hash revealed when a note is spent.
pub type NullifierHash = FieldBytes;

/// A Merkle root of the note tree or the nullifier tree.
pub type MerkleRoot = FieldBytes;

/// Denominator for basis-point rates (1 bps = 1/10,000).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Hard ceiling on the protocol fee, in basis points of the withdrawal amount.
pub const MAX_FEE_BASIS_POINTS: u64 = 100;

/// Largest emergency fee multiplier an authority may schedule.
pub const MAX_EMERGENCY_MULTIPLIER: u64 = 10;

/// Delay between scheduling a multiplier change and its activation (1 hour).
pub const FEE_CHANGE_DELAY_SECONDS: u64 = 3600;

/// Errors raised while parsing shared types from untrusted text.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Decoded value has the wrong length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, TypesError>;

/// Parse a 32-byte value from a hex string, with or without a `0x` prefix.
pub fn parse_bytes32(s: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(s.trim_start_matches("0x"))?;
    let actual = raw.len();
    raw.try_into()
        .map_err(|_| TypesError::InvalidLength { expected: 32, actual })
}
