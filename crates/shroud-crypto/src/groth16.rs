//! Groth16/BN254 proving and verification infrastructure.
//!
//! Keys and proofs cross crate boundaries only in their compressed canonical
//! serialization. The pool never proves; it loads a verifying key from a
//! circuit artifact and checks proofs against public inputs it derives
//! itself. Proving and setup live here for provers and tests.
//!
//! ## Sizes
//!
//! - Proof: 128 bytes compressed (A, C in G1; B in G2)

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::ConstraintSynthesizer;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{CryptoError, Result};

/// Compressed Groth16/BN254 proof size in bytes.
pub const PROOF_SIZE: usize = 128;

/// A serialized Groth16 proof.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedProof {
    #[serde_as(as = "Hex")]
    pub bytes: Vec<u8>,
}

/// A serialized verification key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedVerifyingKey {
    #[serde_as(as = "Hex")]
    pub bytes: Vec<u8>,
}

/// A serialized proving key.
#[derive(Clone, Debug)]
pub struct SerializedProvingKey {
    pub bytes: Vec<u8>,
}

/// Generate proving and verification keys for a circuit using the OS RNG.
///
/// Only tests and local tooling call this; production keys come from the
/// ceremony and ship inside a circuit artifact.
pub fn setup<C: ConstraintSynthesizer<Fr>>(
    circuit: C,
) -> Result<(SerializedProvingKey, SerializedVerifyingKey)> {
    setup_with_rng(circuit, &mut rand::rngs::OsRng)
}

/// Generate keys with a caller-provided RNG.
pub fn setup_with_rng<C, R>(
    circuit: C,
    rng: &mut R,
) -> Result<(SerializedProvingKey, SerializedVerifyingKey)>
where
    C: ConstraintSynthesizer<Fr>,
    R: RngCore + CryptoRng,
{
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
        .map_err(|e| CryptoError::Proof(e.to_string()))?;

    let mut pk_bytes = Vec::new();
    pk.serialize_compressed(&mut pk_bytes)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;

    Ok((
        SerializedProvingKey { bytes: pk_bytes },
        SerializedVerifyingKey::from_key(&vk)?,
    ))
}

/// Generate a Groth16 proof.
pub fn prove<C: ConstraintSynthesizer<Fr>>(
    circuit: C,
    proving_key: &SerializedProvingKey,
) -> Result<SerializedProof> {
    let mut rng = rand::rngs::OsRng;

    let pk = ProvingKey::<Bn254>::deserialize_compressed(&*proving_key.bytes)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;

    let proof = Groth16::<Bn254>::prove(&pk, circuit, &mut rng)
        .map_err(|e| CryptoError::Proof(e.to_string()))?;

    let mut proof_bytes = Vec::new();
    proof
        .serialize_compressed(&mut proof_bytes)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;

    Ok(SerializedProof { bytes: proof_bytes })
}

impl SerializedVerifyingKey {
    /// Serialize a verifying key.
    pub fn from_key(vk: &VerifyingKey<Bn254>) -> Result<Self> {
        let mut bytes = Vec::new();
        vk.serialize_compressed(&mut bytes)
            .map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Deserialize, checking curve and subgroup membership.
    pub fn to_key(&self) -> Result<VerifyingKey<Bn254>> {
        VerifyingKey::<Bn254>::deserialize_compressed(&*self.bytes)
            .map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    /// Number of public inputs the key was generated for.
    pub fn public_input_count(&self) -> Result<usize> {
        Ok(self.to_key()?.gamma_abc_g1.len().saturating_sub(1))
    }
}

impl SerializedProof {
    /// Deserialize, checking curve and subgroup membership.
    pub fn to_proof(&self) -> Result<Proof<Bn254>> {
        Proof::<Bn254>::deserialize_compressed(&*self.bytes)
            .map_err(|e| CryptoError::Serialization(e.to_string()))
    }
}

/// Verify a proof against a prepared key.
///
/// # Errors
///
/// - [`CryptoError::InvalidInput`] if the input count does not match the key
/// - [`CryptoError::Serialization`] if the proof bytes are malformed
pub fn verify_prepared(
    pvk: &PreparedVerifyingKey<Bn254>,
    proof: &SerializedProof,
    public_inputs: &[Fr],
) -> Result<bool> {
    let expected = pvk.vk.gamma_abc_g1.len().saturating_sub(1);
    if public_inputs.len() != expected {
        return Err(CryptoError::InvalidInput(format!(
            "expected {expected} public inputs, got {}",
            public_inputs.len()
        )));
    }

    let proof = proof.to_proof()?;
    Groth16::<Bn254>::verify_with_processed_vk(pvk, public_inputs, &proof)
        .map_err(|e| CryptoError::Proof(e.to_string()))
}

/// Verify a Groth16 proof.
pub fn verify(
    proof: &SerializedProof,
    verifying_key: &SerializedVerifyingKey,
    public_inputs: &[Fr],
) -> Result<bool> {
    let pvk = PreparedVerifyingKey::from(verifying_key.to_key()?);
    verify_prepared(&pvk, proof, public_inputs)
}
