//! Native Poseidon hash over the BN254 scalar field.
//!
//! This is the implementation the pool program runs. It uses the circom
//! parameter set (width `t = n + 1`, 8 full rounds, x^5 S-box, capacity
//! element initialised to zero) so that commitments and nullifiers match
//! what circom-based provers and the in-crate gadget produce.
//!
//! ## Uses
//!
//! - `commitment = H(amount, secret, blinding)`
//! - `nullifier = H(commitment, secret)`
//! - note tree inner nodes `H(left, right)`
//! - nullifier tree leaves `H(value, next_value, next_index)`

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};
use shroud_types::FieldBytes;

use crate::field::{bytes_to_field, field_to_bytes};
use crate::{CryptoError, Result};

/// Largest supported number of inputs.
pub const MAX_INPUTS: usize = 4;

/// Reject arities outside `1..=MAX_INPUTS`.
pub fn check_arity(arity: usize) -> Result<()> {
    if arity == 0 || arity > MAX_INPUTS {
        return Err(CryptoError::InvalidArity {
            arity,
            max: MAX_INPUTS,
        });
    }
    Ok(())
}

/// Hash 1 to 4 field elements.
///
/// # Errors
///
/// - [`CryptoError::InvalidArity`] for zero or more than [`MAX_INPUTS`] inputs
pub fn hash(inputs: &[Fr]) -> Result<Fr> {
    check_arity(inputs.len())?;
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    hasher
        .hash(inputs)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))
}

/// Two-to-one compression, used for Merkle inner nodes.
pub fn hash2(left: &Fr, right: &Fr) -> Result<Fr> {
    hash(&[*left, *right])
}

/// Empty-subtree hashes: `zeros[0] = 0`, `zeros[i + 1] = H(zeros[i], zeros[i])`.
///
/// Returns `height + 1` entries; the last is the root of an empty tree.
pub fn zero_hashes(height: usize) -> Result<Vec<Fr>> {
    let mut zeros = Vec::with_capacity(height + 1);
    let mut current = Fr::from(0u64);
    zeros.push(current);
    for _ in 0..height {
        current = hash2(&current, &current)?;
        zeros.push(current);
    }
    Ok(zeros)
}

/// Hash canonical byte encodings.
///
/// # Errors
///
/// - [`CryptoError::InvalidFieldElement`] if any input is non-canonical
/// - [`CryptoError::InvalidArity`] as for [`hash`]
pub fn hash_bytes(inputs: &[FieldBytes]) -> Result<FieldBytes> {
    let elems = inputs
        .iter()
        .map(bytes_to_field)
        .collect::<Result<Vec<_>>>()?;
    hash(&elems).map(|out| field_to_bytes(&out))
}
