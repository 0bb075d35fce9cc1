//! Hashing and key derivation
//!
//! BLAKE3 is used internally (key derivation, armor checksums). Keccak-256 is
//! used wherever a hash leaves the crate for the EVM side, since that is what
//! contracts compute.

use sha3::{Digest, Keccak256};

/// Size of a hash output in bytes
pub const HASH_SIZE: usize = 32;

/// A hash output
pub type HashOutput = [u8; HASH_SIZE];

/// Hashing and key derivation operations
pub struct Hash;

impl Hash {
    /// BLAKE3 digest of `data`
    pub fn blake3(data: &[u8]) -> HashOutput {
        blake3::hash(data).into()
    }

    /// Keccak-256 digest of `data`, as computed by the EVM
    pub fn keccak256(data: &[u8]) -> HashOutput {
        Keccak256::digest(data).into()
    }

    /// Keccak-256 digest as `0x`-prefixed hex
    pub fn keccak256_hex(data: &[u8]) -> String {
        format!("0x{}", hex::encode(Self::keccak256(data)))
    }

    /// Derive a 32-byte key from arbitrary input material and a context string.
    ///
    /// The context must be unique per purpose, e.g. `"courier-message-v1"`.
    pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
        blake3::derive_key(context, material)
    }

    /// Check that `data` hashes (Keccak-256) to `expected`, in constant time
    pub fn verify_keccak(data: &[u8], expected: &HashOutput) -> bool {
        constant_time_eq(&Self::keccak256(data), expected)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") from the Ethereum yellow paper
        assert_eq!(
            hex::encode(Hash::keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak_hex_prefix() {
        let h = Hash::keccak256_hex(b"hello");
        assert!(h.starts_with("0x"));
        assert_eq!(h.len(), 66);
    }

    #[test]
    fn test_derive_key_context_separation() {
        let material = [9u8; 64];
        let k1 = Hash::derive_key("purpose-1", &material);
        let k2 = Hash::derive_key("purpose-2", &material);
        assert_ne!(k1, k2);
        assert_eq!(k1, Hash::derive_key("purpose-1", &material));
    }

    #[test]
    fn test_verify_keccak() {
        let h = Hash::keccak256(b"ciphertext");
        assert!(Hash::verify_keccak(b"ciphertext", &h));
        assert!(!Hash::verify_keccak(b"tampered", &h));
    }

    #[test]
    fn test_constant_time_eq_lengths() {
        assert!(constant_time_eq(&[1, 2], &[1, 2]));
        assert!(!constant_time_eq(&[1, 2], &[1, 2, 3]));
    }
}
