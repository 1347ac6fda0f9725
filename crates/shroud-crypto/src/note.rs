//! Notes, commitments and nullifiers.
//!
//! - `commitment = H(amount, secret, blinding)`
//! - `nullifier = H(commitment, secret)`
//!
//! The nullifier depends only on the note, so the same note always yields
//! the same nullifier, and it cannot be linked back to the commitment
//! without the secret.

use ark_bn254::Fr;
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use shroud_types::{Commitment, FieldBytes, NullifierHash};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::field::{bytes_to_field, field_to_bytes, u64_to_field};
use crate::{poseidon, Result};

/// Derive a note commitment.
pub fn derive_commitment(amount: u64, secret: &Fr, blinding: &Fr) -> Result<Fr> {
    poseidon::hash(&[u64_to_field(amount), *secret, *blinding])
}

/// Derive the nullifier of a committed note.
pub fn derive_nullifier(commitment: &Fr, secret: &Fr) -> Result<Fr> {
    poseidon::hash2(commitment, secret)
}

/// A spendable note held by a client. Secret material is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Note {
    amount: u64,
    secret: FieldBytes,
    blinding: FieldBytes,
}

impl Note {
    pub fn new(amount: u64, secret: &Fr, blinding: &Fr) -> Self {
        Self {
            amount,
            secret: field_to_bytes(secret),
            blinding: field_to_bytes(blinding),
        }
    }

    /// Sample a fresh note with random secret and blinding factor.
    pub fn random<R: RngCore + CryptoRng>(amount: u64, rng: &mut R) -> Self {
        let secret = Fr::rand(rng);
        let blinding = Fr::rand(rng);
        Self::new(amount, &secret, &blinding)
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn secret(&self) -> Result<Fr> {
        bytes_to_field(&self.secret)
    }

    pub fn blinding(&self) -> Result<Fr> {
        bytes_to_field(&self.blinding)
    }

    pub fn commitment_field(&self) -> Result<Fr> {
        derive_commitment(self.amount, &self.secret()?, &self.blinding()?)
    }

    pub fn commitment(&self) -> Result<Commitment> {
        self.commitment_field().map(|c| field_to_bytes(&c))
    }

    pub fn nullifier(&self) -> Result<NullifierHash> {
        let commitment = self.commitment_field()?;
        derive_nullifier(&commitment, &self.secret()?).map(|n| field_to_bytes(&n))
    }
}

impl std::fmt::Debug for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Note")
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}
