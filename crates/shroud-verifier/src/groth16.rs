//! Proof verification seam and its Groth16/BN254 implementation.

use ark_bn254::{Bn254, Fr};
use ark_groth16::PreparedVerifyingKey;
use shroud_crypto::groth16::{self as crypto_groth16, SerializedProof};
use shroud_crypto::HASH_VERSION;

use crate::artifact::CircuitArtifact;
use crate::statement::{WithdrawalProof, WithdrawalStatement, PUBLIC_INPUT_COUNT};
use crate::{Result, VerifierError};

/// Checks withdrawal proofs against public inputs supplied by the caller.
pub trait ProofVerifier {
    /// Version of the circuit artifact this verifier was loaded from.
    fn artifact_version(&self) -> u32;

    /// Digest identifying the loaded verifying key.
    fn verification_key_hash(&self) -> [u8; 32];

    /// Verify `proof` against `public_inputs`. `Ok(false)` means the proof
    /// is well formed but does not verify.
    fn verify(&self, proof: &SerializedProof, public_inputs: &[Fr]) -> Result<bool>;
}

/// Groth16 verifier over BN254 with a prepared verifying key.
pub struct Groth16Verifier {
    version: u32,
    key_hash: [u8; 32],
    pvk: PreparedVerifyingKey<Bn254>,
}

impl Groth16Verifier {
    /// Load a verifier from a withdrawal circuit artifact.
    ///
    /// # Errors
    ///
    /// - [`VerifierError::InvalidArtifact`] if the artifact was built for a
    ///   different hash version or public input count
    pub fn from_artifact(artifact: &CircuitArtifact) -> Result<Self> {
        if artifact.hash_version != HASH_VERSION {
            return Err(VerifierError::InvalidArtifact(format!(
                "hash version {} does not match {HASH_VERSION}",
                artifact.hash_version
            )));
        }
        let vk = artifact.verifying_key.to_key()?;
        let inputs = vk.gamma_abc_g1.len().saturating_sub(1);
        if inputs != PUBLIC_INPUT_COUNT {
            return Err(VerifierError::InvalidArtifact(format!(
                "verifying key takes {inputs} public inputs, withdrawal circuit has {PUBLIC_INPUT_COUNT}"
            )));
        }

        let key_hash = artifact.digest()?;
        tracing::info!(
            version = artifact.version,
            key_hash = %hex::encode(key_hash),
            "withdrawal verifier loaded"
        );
        Ok(Self {
            version: artifact.version,
            key_hash,
            pvk: PreparedVerifyingKey::from(vk),
        })
    }

    /// Parse an artifact blob and load it.
    pub fn from_artifact_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_artifact(&CircuitArtifact::decode(bytes)?)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn artifact_version(&self) -> u32 {
        self.version
    }

    fn verification_key_hash(&self) -> [u8; 32] {
        self.key_hash
    }

    fn verify(&self, proof: &SerializedProof, public_inputs: &[Fr]) -> Result<bool> {
        Ok(crypto_groth16::verify_prepared(
            &self.pvk,
            proof,
            public_inputs,
        )?)
    }
}

/// Verify a submitted withdrawal proof against the statement derived from
/// the withdrawal arguments.
///
/// # Errors
///
/// - [`VerifierError::ArtifactVersionMismatch`] for proofs built against
///   another artifact
/// - [`VerifierError::PublicInputMismatch`] /
///   [`VerifierError::PublicInputCountMismatch`] when the carried inputs
///   disagree with the derived ones
/// - [`VerifierError::InvalidProof`] when the pairing check fails
pub fn verify_withdrawal<V: ProofVerifier + ?Sized>(
    verifier: &V,
    proof: &WithdrawalProof,
    statement: &WithdrawalStatement,
) -> Result<()> {
    if proof.artifact_version != verifier.artifact_version() {
        return Err(VerifierError::ArtifactVersionMismatch {
            expected: verifier.artifact_version(),
            actual: proof.artifact_version,
        });
    }

    let derived = statement.public_inputs()?;
    let derived_bytes = statement.public_input_bytes()?;
    proof.check_binding(&derived_bytes)?;

    if !verifier.verify(&proof.proof, &derived)? {
        tracing::warn!("withdrawal proof rejected");
        return Err(VerifierError::InvalidProof);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::field::u64_to_bytes;
    use shroud_types::AccountId;
    use std::cell::Cell;

    /// Records the inputs it was asked about and answers with a fixed value.
    struct Recording {
        answer: bool,
        calls: Cell<usize>,
        last_amount: Cell<Option<Fr>>,
    }

    impl ProofVerifier for Recording {
        fn artifact_version(&self) -> u32 {
            3
        }

        fn verification_key_hash(&self) -> [u8; 32] {
            [0u8; 32]
        }

        fn verify(&self, _proof: &SerializedProof, public_inputs: &[Fr]) -> Result<bool> {
            self.calls.set(self.calls.get() + 1);
            self.last_amount.set(public_inputs.get(4).copied());
            Ok(self.answer)
        }
    }

    fn recording(answer: bool) -> Recording {
        Recording {
            answer,
            calls: Cell::new(0),
            last_amount: Cell::new(None),
        }
    }

    fn statement() -> WithdrawalStatement {
        WithdrawalStatement {
            root: u64_to_bytes(1),
            nullifier: u64_to_bytes(2),
            recipient: AccountId::new([7u8; 32]),
            amount: 500,
            max_fee: 5,
        }
    }

    fn proof_for(statement: &WithdrawalStatement, version: u32) -> WithdrawalProof {
        WithdrawalProof {
            artifact_version: version,
            proof: SerializedProof { bytes: vec![0; 128] },
            public_inputs: statement.public_input_bytes().expect("inputs"),
        }
    }

    #[test]
    fn test_verifies_on_derived_inputs() {
        let verifier = recording(true);
        let s = statement();
        verify_withdrawal(&verifier, &proof_for(&s, 3), &s).expect("verifies");
        assert_eq!(verifier.calls.get(), 1);
        assert_eq!(verifier.last_amount.get(), Some(Fr::from(500u64)));
    }

    #[test]
    fn test_version_mismatch_short_circuits() {
        let verifier = recording(true);
        let s = statement();
        assert!(matches!(
            verify_withdrawal(&verifier, &proof_for(&s, 2), &s),
            Err(VerifierError::ArtifactVersionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(verifier.calls.get(), 0);
    }

    #[test]
    fn test_mismatched_claim_never_reaches_pairing() {
        let verifier = recording(true);
        let s = statement();
        let mut other = s;
        other.amount = 10_000;
        assert!(matches!(
            verify_withdrawal(&verifier, &proof_for(&other, 3), &s),
            Err(VerifierError::PublicInputMismatch { index: 4, .. })
        ));
        assert_eq!(verifier.calls.get(), 0);
    }

    #[test]
    fn test_failed_pairing_is_invalid_proof() {
        let verifier = recording(false);
        let s = statement();
        assert!(matches!(
            verify_withdrawal(&verifier, &proof_for(&s, 3), &s),
            Err(VerifierError::InvalidProof)
        ));
    }
}
