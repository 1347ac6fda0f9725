//! Portable Poseidon permutation.
//!
//! A second, self-contained implementation of the permutation, written
//! directly over [`Fr`] from the published circom round constants. Client
//! libraries and provers run this path; it shares no code with the native
//! hasher beyond the constant tables, so a divergence in either shows up in
//! the parity tests.

use ark_bn254::Fr;
use ark_ff::{Field, Zero};
use light_poseidon::parameters::bn254_x5;

use crate::poseidon::check_arity;
use crate::{CryptoError, Result};

/// Round constants and MDS matrix for one permutation width.
///
/// Only built through [`SpongeParams::new`], which checks the table shape,
/// so the permutations can walk it without bounds failures.
#[derive(Clone, Debug)]
pub struct SpongeParams {
    /// Round constants, `(full_rounds + partial_rounds) * width` elements.
    round_constants: Vec<Fr>,
    /// MDS matrix (`width x width`).
    mds_matrix: Vec<Vec<Fr>>,
    full_rounds: usize,
    partial_rounds: usize,
    width: usize,
    /// S-box exponent.
    alpha: u64,
}

impl SpongeParams {
    /// Assemble a parameter table, rejecting one whose constants or matrix
    /// do not match `width` and the round counts.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::Poseidon`] for a malformed table
    pub fn new(
        round_constants: Vec<Fr>,
        mds_matrix: Vec<Vec<Fr>>,
        full_rounds: usize,
        partial_rounds: usize,
        alpha: u64,
    ) -> Result<Self> {
        let width = mds_matrix.len();
        if width < 2 {
            return Err(CryptoError::Poseidon(format!("width {width} below 2")));
        }
        if full_rounds % 2 != 0 {
            return Err(CryptoError::Poseidon(format!(
                "full round count {full_rounds} is odd"
            )));
        }
        let expected = full_rounds
            .checked_add(partial_rounds)
            .and_then(|rounds| rounds.checked_mul(width))
            .ok_or_else(|| CryptoError::Poseidon("round count overflows".into()))?;
        if round_constants.len() != expected {
            return Err(CryptoError::Poseidon(format!(
                "{} round constants for width {width}, expected {expected}",
                round_constants.len()
            )));
        }
        if mds_matrix.iter().any(|row| row.len() != width) {
            return Err(CryptoError::Poseidon(format!(
                "MDS matrix is not {width}x{width}"
            )));
        }
        Ok(Self {
            round_constants,
            mds_matrix,
            full_rounds,
            partial_rounds,
            width,
            alpha,
        })
    }

    /// Parameters for hashing `arity` inputs (width `arity + 1`).
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidArity`] for unsupported arities
    pub fn for_arity(arity: usize) -> Result<Self> {
        check_arity(arity)?;
        let width = u8::try_from(arity + 1).map_err(|_| CryptoError::InvalidArity {
            arity,
            max: crate::poseidon::MAX_INPUTS,
        })?;
        let params = bn254_x5::get_poseidon_parameters::<Fr>(width)
            .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
        let table = Self::new(
            params.ark,
            params.mds,
            params.full_rounds,
            params.partial_rounds,
            params.alpha,
        )?;
        if table.width != params.width {
            return Err(CryptoError::Poseidon(format!(
                "malformed parameter table for width {width}"
            )));
        }
        Ok(table)
    }

    pub fn round_constants(&self) -> &[Fr] {
        &self.round_constants
    }

    pub fn mds_matrix(&self) -> &[Vec<Fr>] {
        &self.mds_matrix
    }

    pub fn full_rounds(&self) -> usize {
        self.full_rounds
    }

    pub fn partial_rounds(&self) -> usize {
        self.partial_rounds
    }

    /// State width, one more than the number of inputs.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn alpha(&self) -> u64 {
        self.alpha
    }

    /// Whether `round` applies the S-box to the whole state.
    pub fn is_full_round(&self, round: usize) -> bool {
        let half_f = self.full_rounds / 2;
        round < half_f || round >= half_f + self.partial_rounds
    }
}

fn sbox(x: Fr, alpha: u64) -> Fr {
    x.pow([alpha])
}

/// MDS matrix-vector multiplication.
fn mds_mul(matrix: &[Vec<Fr>], state: &[Fr]) -> Vec<Fr> {
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .zip(state)
                .fold(Fr::zero(), |acc, (m, s)| acc + *m * s)
        })
        .collect()
}

/// Run the permutation over `[0, inputs..]` and return `state[0]`.
pub fn permute(params: &SpongeParams, inputs: &[Fr]) -> Result<Fr> {
    if inputs.len() + 1 != params.width {
        return Err(CryptoError::InvalidArity {
            arity: inputs.len(),
            max: params.width.saturating_sub(1),
        });
    }

    let t = params.width;
    let mut state = Vec::with_capacity(t);
    state.push(Fr::zero());
    state.extend_from_slice(inputs);

    for (round, constants) in params.round_constants.chunks_exact(t).enumerate() {
        for (s, c) in state.iter_mut().zip(constants) {
            *s += c;
        }

        if params.is_full_round(round) {
            for s in state.iter_mut() {
                *s = sbox(*s, params.alpha);
            }
        } else {
            state[0] = sbox(state[0], params.alpha);
        }

        state = mds_mul(&params.mds_matrix, &state);
    }

    Ok(state[0])
}

/// Hash 1 to 4 field elements.
pub fn hash(inputs: &[Fr]) -> Result<Fr> {
    let params = SpongeParams::for_arity(inputs.len())?;
    permute(&params, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_shape() {
        let params = SpongeParams::for_arity(2).expect("params");
        assert_eq!(params.width(), 3);
        assert_eq!(params.full_rounds(), 8);
        assert_eq!(params.alpha(), 5);
        assert_eq!(
            params.round_constants().len(),
            (params.full_rounds() + params.partial_rounds()) * 3
        );
    }

    #[test]
    fn test_short_table_rejected() {
        let params = SpongeParams::for_arity(2).expect("params");
        let mut constants = params.round_constants().to_vec();
        constants.truncate(constants.len() - 1);
        assert!(matches!(
            SpongeParams::new(
                constants,
                params.mds_matrix().to_vec(),
                params.full_rounds(),
                params.partial_rounds(),
                params.alpha(),
            ),
            Err(CryptoError::Poseidon(_))
        ));

        let mut ragged = params.mds_matrix().to_vec();
        ragged[1].pop();
        assert!(SpongeParams::new(
            params.round_constants().to_vec(),
            ragged,
            params.full_rounds(),
            params.partial_rounds(),
            params.alpha(),
        )
        .is_err());
    }

    #[test]
    fn test_rebuilt_table_hashes_identically() {
        let params = SpongeParams::for_arity(3).expect("params");
        let rebuilt = SpongeParams::new(
            params.round_constants().to_vec(),
            params.mds_matrix().to_vec(),
            params.full_rounds(),
            params.partial_rounds(),
            params.alpha(),
        )
        .expect("same shape");
        let inputs = [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        assert_eq!(
            permute(&rebuilt, &inputs).expect("rebuilt"),
            hash(&inputs).expect("original")
        );
    }

    #[test]
    fn test_sbox() {
        assert_eq!(sbox(Fr::from(3u64), 5), Fr::from(243u64));
    }

    #[test]
    fn test_matches_native() {
        for arity in 1..=4u64 {
            let inputs: Vec<Fr> = (1..=arity).map(Fr::from).collect();
            let native = crate::poseidon::hash(&inputs).expect("native");
            let portable = hash(&inputs).expect("sponge");
            assert_eq!(native, portable, "arity {arity}");
        }
    }

    #[test]
    fn test_width_mismatch() {
        let params = SpongeParams::for_arity(2).expect("params");
        assert!(permute(&params, &[Fr::from(1u64)]).is_err());
    }

    #[test]
    fn test_invalid_arity() {
        assert!(matches!(
            SpongeParams::for_arity(0),
            Err(CryptoError::InvalidArity { .. })
        ));
    }
}
