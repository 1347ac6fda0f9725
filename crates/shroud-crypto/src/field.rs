//! Canonical encoding of BN254 scalar field elements.
//!
//! Every field element that crosses a trust boundary is carried as 32
//! big-endian bytes. Decoding never reduces: an encoding `>= p` is rejected
//! so that two distinct byte strings can never name the same nullifier.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use shroud_types::FieldBytes;

use crate::{CryptoError, Result};

/// Decode a canonical big-endian encoding.
///
/// # Errors
///
/// - [`CryptoError::InvalidFieldElement`] if `bytes` encodes a value `>= p`
pub fn bytes_to_field(bytes: &FieldBytes) -> Result<Fr> {
    let fe = Fr::from_be_bytes_mod_order(bytes);
    if field_to_bytes(&fe) != *bytes {
        return Err(CryptoError::InvalidFieldElement(hex::encode(bytes)));
    }
    Ok(fe)
}

/// Encode a field element as 32 big-endian bytes.
pub fn field_to_bytes(fe: &Fr) -> FieldBytes {
    let be = fe.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    let start = out.len().saturating_sub(be.len());
    out[start..].copy_from_slice(&be[be.len().saturating_sub(32)..]);
    out
}

/// Whether `bytes` is the canonical encoding of some field element.
pub fn is_canonical(bytes: &FieldBytes) -> bool {
    bytes_to_field(bytes).is_ok()
}

/// Lift a `u64` into the field.
pub fn u64_to_field(value: u64) -> Fr {
    Fr::from(value)
}

/// Lift a 16-byte big-endian half into the field. Always below the modulus.
pub fn half_to_field(half: &[u8; 16]) -> Fr {
    Fr::from(u128::from_be_bytes(*half))
}

/// Encoding of `u64` values, as used for amounts in public inputs.
pub fn u64_to_bytes(value: u64) -> FieldBytes {
    field_to_bytes(&u64_to_field(value))
}
