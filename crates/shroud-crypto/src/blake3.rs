//! Domain-separated BLAKE3 hashing.
//!
//! BLAKE3 is used only outside circuits: membership-filter bit positions
//! and circuit artifact fingerprints. Anything a proof must reproduce uses
//! Poseidon instead.
//!
//! ## Modes
//!
//! - [`hash`] — Plain hashing
//! - [`derive_key`] — Context-separated derivation

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const NULLIFIER_FILTER: &str = "Shroud v1 nullifier-filter";
    pub const CIRCUIT_ARTIFACT: &str = "Shroud v1 circuit-artifact";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[NULLIFIER_FILTER, CIRCUIT_ARTIFACT];
}

/// Compute the BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive 32 bytes from `key_material` under a registered context string.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields as `LE32(len) || field` pairs.
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(ctx.starts_with("Shroud v1 "), "bad prefix: {ctx}");
        }
        assert!(is_registered_context(contexts::CIRCUIT_ARTIFACT));
        assert!(!is_registered_context("Shroud v1 made-up"));
    }

    #[test]
    fn test_derive_key_separates_contexts() {
        let a = derive_key(contexts::NULLIFIER_FILTER, b"x");
        let b = derive_key(contexts::CIRCUIT_ARTIFACT, b"x");
        assert_ne!(a, b);
        assert_ne!(a, hash(b"x"));
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"ab", b"c"]);
        assert_eq!(encoded, [2, 0, 0, 0, b'a', b'b', 1, 0, 0, 0, b'c']);
    }
}
