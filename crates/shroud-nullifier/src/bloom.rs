//! Bloom-filter prefilter for nullifier lookups.
//!
//! Sits in front of the exact record and tree lookups. Every spent
//! nullifier is inserted and nothing is ever removed, so a negative answer
//! is definitive and the exact lookups are skipped. A positive answer may
//! be a false positive and always falls through to the exact structures.
//!
//! Bit positions: `BLAKE3::derive_key("Shroud v1 nullifier-filter", LE32(1) || i || LE32(32) || nullifier)`
//! for `i` in `0..hash_count`, first 8 bytes little-endian modulo the bit count.

use shroud_crypto::blake3;

use crate::{NullifierError, Result};

/// Default filter size in bytes (2 Mbit).
pub const DEFAULT_FILTER_BYTES: usize = 262_144;

/// Default number of hash functions.
pub const DEFAULT_HASH_COUNT: u8 = 10;

/// A fixed-size Bloom filter over 32-byte nullifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipFilter {
    bits: Vec<u8>,
    hash_count: u8,
    count: u64,
}

impl MembershipFilter {
    /// Create an empty filter.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::InvalidConfig`] for a zero size or hash count
    pub fn new(size_bytes: usize, hash_count: u8) -> Result<Self> {
        if size_bytes == 0 || hash_count == 0 {
            return Err(NullifierError::InvalidConfig(format!(
                "filter needs non-zero size and hash count (got {size_bytes} bytes, k = {hash_count})"
            )));
        }
        Ok(Self {
            bits: vec![0u8; size_bytes],
            hash_count,
            count: 0,
        })
    }

    pub fn insert(&mut self, nullifier: &[u8; 32]) {
        for pos in self.positions(nullifier) {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
        self.count += 1;
    }

    /// `false` means definitely absent.
    pub fn may_contain(&self, nullifier: &[u8; 32]) -> bool {
        self.positions(nullifier)
            .into_iter()
            .all(|pos| (self.bits[pos / 8] >> (pos % 8)) & 1 == 1)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Estimated false-positive rate at the current load.
    pub fn false_positive_rate(&self) -> f64 {
        let k = f64::from(self.hash_count);
        let m = (self.bits.len() * 8) as f64;
        let n = self.count as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    fn positions(&self, nullifier: &[u8; 32]) -> Vec<usize> {
        let bit_len = self.bits.len() * 8;
        (0..self.hash_count)
            .map(|i| {
                let input = blake3::encode_multi_field(&[&[i], nullifier]);
                let digest = blake3::derive_key(blake3::contexts::NULLIFIER_FILTER, &input);
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&digest[..8]);
                (u64::from_le_bytes(buf) % bit_len as u64) as usize
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> MembershipFilter {
        MembershipFilter::new(1024, 4).expect("filter")
    }

    #[test]
    fn test_insert_and_probe() {
        let mut f = filter();
        let n = [0x42u8; 32];
        assert!(!f.may_contain(&n));
        f.insert(&n);
        assert!(f.may_contain(&n));
        assert_eq!(f.count(), 1);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut f = filter();
        let values: Vec<[u8; 32]> = (0..200u8).map(|i| [i; 32]).collect();
        for v in &values {
            f.insert(v);
        }
        assert!(values.iter().all(|v| f.may_contain(v)));
    }

    #[test]
    fn test_false_positive_rate_zero_when_empty() {
        assert_eq!(filter().false_positive_rate(), 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(MembershipFilter::new(0, 4).is_err());
        assert!(MembershipFilter::new(16, 0).is_err());
    }
}
