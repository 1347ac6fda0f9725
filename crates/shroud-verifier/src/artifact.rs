//! Circuit artifacts.
//!
//! Binary layout, all integers big-endian:
//!
//! ```text
//! magic "SHRD" (4) || version u32 || hash_version u32 || public_inputs u32
//!   || vk_len u32 || verifying key (vk_len, compressed arkworks encoding)
//! ```

use shroud_crypto::blake3::{self, contexts};
use shroud_crypto::groth16::SerializedVerifyingKey;
use shroud_crypto::HASH_VERSION;

use crate::{Result, VerifierError};

/// Leading bytes of every artifact.
pub const ARTIFACT_MAGIC: [u8; 4] = *b"SHRD";

const HEADER_LEN: usize = 4 + 4 * 4;

/// A verifying key tagged with the circuit version it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitArtifact {
    pub version: u32,
    /// Poseidon parameter version the circuit was compiled with.
    pub hash_version: u32,
    pub public_inputs: u32,
    pub verifying_key: SerializedVerifyingKey,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| VerifierError::InvalidArtifact("truncated header".into()))
}

impl CircuitArtifact {
    /// Wrap a verifying key produced by a setup for the current hash version.
    pub fn new(version: u32, verifying_key: SerializedVerifyingKey) -> Result<Self> {
        let count = verifying_key.public_input_count()?;
        let public_inputs = u32::try_from(count)
            .map_err(|_| VerifierError::InvalidArtifact(format!("{count} public inputs")))?;
        Ok(Self {
            version,
            hash_version: HASH_VERSION,
            public_inputs,
            verifying_key,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let vk_len = u32::try_from(self.verifying_key.bytes.len())
            .map_err(|_| VerifierError::InvalidArtifact("verifying key too large".into()))?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.verifying_key.bytes.len());
        out.extend_from_slice(&ARTIFACT_MAGIC);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.hash_version.to_be_bytes());
        out.extend_from_slice(&self.public_inputs.to_be_bytes());
        out.extend_from_slice(&vk_len.to_be_bytes());
        out.extend_from_slice(&self.verifying_key.bytes);
        Ok(out)
    }

    /// Parse an artifact blob.
    ///
    /// # Errors
    ///
    /// - [`VerifierError::InvalidArtifact`] on bad magic, truncation,
    ///   trailing bytes, or a key whose input count disagrees with the header
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.get(..4) != Some(&ARTIFACT_MAGIC[..]) {
            return Err(VerifierError::InvalidArtifact("bad magic".into()));
        }
        let version = read_u32(bytes, 4)?;
        let hash_version = read_u32(bytes, 8)?;
        let public_inputs = read_u32(bytes, 12)?;
        let vk_len = read_u32(bytes, 16)? as usize;

        let body = &bytes[HEADER_LEN..];
        if body.len() != vk_len {
            return Err(VerifierError::InvalidArtifact(format!(
                "verifying key length {vk_len}, blob carries {}",
                body.len()
            )));
        }

        let verifying_key = SerializedVerifyingKey {
            bytes: body.to_vec(),
        };
        let key_inputs = verifying_key.public_input_count()?;
        if key_inputs != public_inputs as usize {
            return Err(VerifierError::InvalidArtifact(format!(
                "header declares {public_inputs} public inputs, key has {key_inputs}"
            )));
        }

        Ok(Self {
            version,
            hash_version,
            public_inputs,
            verifying_key,
        })
    }

    /// Domain-separated digest of the encoded artifact.
    pub fn digest(&self) -> Result<[u8; 32]> {
        Ok(blake3::derive_key(contexts::CIRCUIT_ARTIFACT, &self.encode()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_magic() {
        let err = CircuitArtifact::decode(b"NOPE\0\0\0\0").expect_err("magic");
        assert!(matches!(err, VerifierError::InvalidArtifact(_)));
    }

    #[test]
    fn test_truncated_header() {
        let err = CircuitArtifact::decode(b"SHRD\0\0\0\x01").expect_err("short");
        assert!(matches!(err, VerifierError::InvalidArtifact(_)));
    }

    #[test]
    fn test_length_mismatch() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&ARTIFACT_MAGIC);
        for v in [1u32, HASH_VERSION, 6, 10] {
            blob.extend_from_slice(&v.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; 4]);
        let err = CircuitArtifact::decode(&blob).expect_err("length");
        assert!(matches!(err, VerifierError::InvalidArtifact(msg) if msg.contains("length")));
    }
}
