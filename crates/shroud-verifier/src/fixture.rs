//! Reference withdrawal circuit.
//!
//! Proves, for the six public inputs of [`crate::statement`]:
//!
//! - `commitment = H(amount, secret, blinding)`
//! - `commitment` sits at `leaf_index` under `root`
//! - `nullifier = H(commitment, secret)`
//!
//! and binds `recipient_hi`, `recipient_lo` and `max_fee` with a squaring
//! constraint each, so a proof cannot be replayed with another recipient or
//! fee ceiling. Used by tests and local tooling; production artifacts come
//! from the ceremony.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use shroud_crypto::field::bytes_to_field;
use shroud_crypto::gadget;
use shroud_crypto::note::Note;
use shroud_types::FieldBytes;

use crate::statement::{WithdrawalStatement, PUBLIC_INPUT_COUNT};
use crate::Result;

/// Witness and public inputs of one withdrawal.
#[derive(Clone)]
pub struct WithdrawBindingCircuit {
    public: [Fr; PUBLIC_INPUT_COUNT],
    secret: Fr,
    blinding: Fr,
    siblings: Vec<Fr>,
    path_bits: Vec<bool>,
}

impl WithdrawBindingCircuit {
    /// A circuit of the right shape for key generation. Values are arbitrary.
    pub fn blank(tree_height: usize) -> Self {
        Self {
            public: [Fr::from(0u64); PUBLIC_INPUT_COUNT],
            secret: Fr::from(0u64),
            blinding: Fr::from(0u64),
            siblings: vec![Fr::from(0u64); tree_height],
            path_bits: vec![false; tree_height],
        }
    }

    /// Assemble the witness for spending `note` at `leaf_index`.
    pub fn new(
        note: &Note,
        leaf_index: u64,
        siblings: &[FieldBytes],
        statement: &WithdrawalStatement,
    ) -> Result<Self> {
        let siblings = siblings
            .iter()
            .map(bytes_to_field)
            .collect::<shroud_crypto::Result<Vec<_>>>()?;
        let path_bits = (0..siblings.len())
            .map(|level| (leaf_index >> level) & 1 == 1)
            .collect();
        Ok(Self {
            public: statement.public_inputs()?,
            secret: note.secret()?,
            blinding: note.blinding()?,
            siblings,
            path_bits,
        })
    }

    /// The public inputs this witness proves.
    pub fn public_inputs(&self) -> &[Fr; PUBLIC_INPUT_COUNT] {
        &self.public
    }
}

impl ConstraintSynthesizer<Fr> for WithdrawBindingCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> std::result::Result<(), SynthesisError> {
        let [root, nullifier, recipient_hi, recipient_lo, amount, max_fee] = self
            .public
            .map(|value| FpVar::new_input(cs.clone(), || Ok(value)));
        let (root, nullifier) = (root?, nullifier?);
        let (recipient_hi, recipient_lo) = (recipient_hi?, recipient_lo?);
        let (amount, max_fee) = (amount?, max_fee?);

        let secret = FpVar::new_witness(cs.clone(), || Ok(self.secret))?;
        let blinding = FpVar::new_witness(cs.clone(), || Ok(self.blinding))?;

        let commitment = gadget::hash(&[amount, secret.clone(), blinding])?;
        gadget::hash(&[commitment.clone(), secret])?.enforce_equal(&nullifier)?;

        let mut node = commitment;
        for (sibling, bit) in self.siblings.iter().zip(&self.path_bits) {
            let sibling = FpVar::new_witness(cs.clone(), || Ok(*sibling))?;
            let is_right = Boolean::new_witness(cs.clone(), || Ok(*bit))?;
            let left = FpVar::conditionally_select(&is_right, &sibling, &node)?;
            let right = FpVar::conditionally_select(&is_right, &node, &sibling)?;
            node = gadget::hash(&[left, right])?;
        }
        node.enforce_equal(&root)?;

        for bound in [recipient_hi, recipient_lo, max_fee] {
            let squared = bound.square()?;
            squared.enforce_equal(&(&bound * &bound))?;
        }
        Ok(())
    }
}
