//! Poseidon as an R1CS gadget.
//!
//! The third implementation of the hash, evaluated inside proof circuits.
//! It replays the same round schedule as [`crate::sponge`] over `FpVar`s;
//! the parity tests check both its witness values and that the generated
//! constraint system is satisfied.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::SynthesisError;

use crate::sponge::SpongeParams;

/// Hash `inputs` inside a circuit using explicit parameters.
pub fn permute(
    params: &SpongeParams,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let t = params.width();
    if inputs.len() + 1 != t {
        return Err(SynthesisError::Unsatisfiable);
    }
    let alpha = params.alpha();

    let mut state: Vec<FpVar<Fr>> = Vec::with_capacity(t);
    state.push(FpVar::zero());
    state.extend(inputs.iter().cloned());

    for (round, constants) in params.round_constants().chunks_exact(t).enumerate() {
        for (s, c) in state.iter_mut().zip(constants) {
            *s += *c;
        }

        if params.is_full_round(round) {
            for s in state.iter_mut() {
                *s = s.pow_by_constant([alpha])?;
            }
        } else {
            state[0] = state[0].pow_by_constant([alpha])?;
        }

        let mut next = Vec::with_capacity(t);
        for row in params.mds_matrix() {
            let mut acc = FpVar::zero();
            for (m, s) in row.iter().zip(&state) {
                acc += s * *m;
            }
            next.push(acc);
        }
        state = next;
    }

    Ok(state.swap_remove(0))
}

/// Hash 1 to 4 circuit variables.
pub fn hash(inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let params =
        SpongeParams::for_arity(inputs.len()).map_err(|_| SynthesisError::Unsatisfiable)?;
    permute(&params, inputs)
}
