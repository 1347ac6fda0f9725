//! Withdrawal statements and their public inputs.
//!
//! Public input order is fixed:
//!
//! | index | name           | encoding                              |
//! |-------|----------------|---------------------------------------|
//! | 0     | `root`         | canonical field element               |
//! | 1     | `nullifier`    | canonical field element               |
//! | 2     | `recipient_hi` | high 16 bytes of the recipient        |
//! | 3     | `recipient_lo` | low 16 bytes of the recipient         |
//! | 4     | `amount`       | `u64`                                 |
//! | 5     | `max_fee`      | `u64`, fee ceiling the owner accepted |

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shroud_crypto::field::{bytes_to_field, field_to_bytes, half_to_field, u64_to_field};
use shroud_crypto::groth16::SerializedProof;
use shroud_types::{AccountId, FieldBytes, MerkleRoot, NullifierHash};

use crate::{Result, VerifierError};

/// Number of public inputs of the withdrawal circuit.
pub const PUBLIC_INPUT_COUNT: usize = 6;

/// Names of the public inputs, by position.
pub const PUBLIC_INPUT_NAMES: [&str; PUBLIC_INPUT_COUNT] = [
    "root",
    "nullifier",
    "recipient_hi",
    "recipient_lo",
    "amount",
    "max_fee",
];

/// The claim a withdrawal proof must establish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalStatement {
    pub root: MerkleRoot,
    pub nullifier: NullifierHash,
    pub recipient: AccountId,
    pub amount: u64,
    pub max_fee: u64,
}

impl WithdrawalStatement {
    /// Derive the public input vector.
    ///
    /// # Errors
    ///
    /// - [`VerifierError::NonCanonicalInput`] if the root or nullifier is not
    ///   a canonical field encoding
    pub fn public_inputs(&self) -> Result<[Fr; PUBLIC_INPUT_COUNT]> {
        let root = bytes_to_field(&self.root)
            .map_err(|_| VerifierError::NonCanonicalInput { name: "root" })?;
        let nullifier = bytes_to_field(&self.nullifier)
            .map_err(|_| VerifierError::NonCanonicalInput { name: "nullifier" })?;
        let (hi, lo) = self.recipient.split_halves();

        Ok([
            root,
            nullifier,
            half_to_field(&hi),
            half_to_field(&lo),
            u64_to_field(self.amount),
            u64_to_field(self.max_fee),
        ])
    }

    /// Public inputs in their 32-byte wire encoding.
    pub fn public_input_bytes(&self) -> Result<Vec<FieldBytes>> {
        Ok(self.public_inputs()?.iter().map(field_to_bytes).collect())
    }
}

/// A proof as submitted with a withdrawal.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalProof {
    /// Version of the circuit artifact the proof was generated against.
    pub artifact_version: u32,
    pub proof: SerializedProof,
    /// Public inputs as claimed by the prover.
    #[serde_as(as = "Vec<Hex>")]
    pub public_inputs: Vec<FieldBytes>,
}

impl WithdrawalProof {
    /// Require the carried inputs to equal `derived`, element by element.
    pub fn check_binding(&self, derived: &[FieldBytes]) -> Result<()> {
        if self.public_inputs.len() != derived.len() {
            return Err(VerifierError::PublicInputCountMismatch {
                expected: derived.len(),
                actual: self.public_inputs.len(),
            });
        }
        for (index, (claimed, expected)) in self.public_inputs.iter().zip(derived).enumerate() {
            if claimed != expected {
                return Err(VerifierError::PublicInputMismatch {
                    index,
                    name: PUBLIC_INPUT_NAMES.get(index).copied().unwrap_or("unknown"),
                });
            }
        }
        Ok(())
    }
}
