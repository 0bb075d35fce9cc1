//! X25519 key agreement
//!
//! Message keypairs and per-message ephemeral keys are both X25519. A sender
//! agrees a shared secret between a fresh ephemeral secret and the
//! recipient's public key; the recipient repeats the agreement from the other
//! side with its static secret.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use super::error::{CryptoError, CryptoResult};

/// Size of an X25519 key in bytes
pub const KEY_SIZE: usize = 32;

/// A public key for key agreement
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangePublicKey(pub [u8; KEY_SIZE]);

impl ExchangePublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(ExchangePublicKey(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Convert to hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short fingerprint for logs and display
    pub fn fingerprint(&self) -> String {
        self.to_hex()[..16].to_string()
    }
}

impl std::fmt::Debug for ExchangePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangePublicKey({}...)", self.fingerprint())
    }
}

/// Shared secret derived from key agreement
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    secret: [u8; KEY_SIZE],
}

impl SharedSecret {
    /// Raw bytes, for feeding a KDF
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }

    /// An all-zero output means the peer key was a low-order point
    pub fn is_contributory(&self) -> bool {
        self.secret.iter().any(|b| *b != 0)
    }
}

/// An X25519 keypair
///
/// The secret half is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct ExchangeKeypair {
    #[zeroize(skip)]
    public_key: ExchangePublicKey,
    secret_key: [u8; KEY_SIZE],
}

impl ExchangeKeypair {
    /// Generate a fresh random keypair, reporting entropy failures
    pub fn try_generate() -> CryptoResult<Self> {
        use rand::RngCore;

        let mut secret = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

        let static_secret = StaticSecret::from(secret);
        let public = X25519Public::from(&static_secret);

        Ok(ExchangeKeypair {
            public_key: ExchangePublicKey(public.to_bytes()),
            secret_key: static_secret.to_bytes(),
        })
    }

    /// Rebuild from secret bytes plus the public half that was stored with it.
    ///
    /// Fails if the public half does not belong to the secret.
    pub fn from_parts(secret: &[u8], public: &[u8]) -> CryptoResult<Self> {
        let secret: [u8; KEY_SIZE] =
            secret.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: secret.len(),
            })?;
        let claimed = ExchangePublicKey::from_bytes(public)?;

        let derived = X25519Public::from(&StaticSecret::from(secret)).to_bytes();
        if derived != claimed.0 {
            return Err(CryptoError::InvalidSecretKey);
        }

        Ok(ExchangeKeypair {
            public_key: claimed,
            secret_key: secret,
        })
    }

    /// Public half
    pub fn public_key(&self) -> &ExchangePublicKey {
        &self.public_key
    }

    /// Secret bytes. Never log or transmit these.
    pub fn secret_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret_key
    }

    /// Agree a shared secret with a peer's public key
    pub fn diffie_hellman(&self, peer_public: &ExchangePublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.secret_key);
        let shared = secret.diffie_hellman(&X25519Public::from(peer_public.0));

        SharedSecret {
            secret: shared.to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_matches() {
        let alice = ExchangeKeypair::try_generate().unwrap();
        let bob = ExchangeKeypair::try_generate().unwrap();

        let a = alice.diffie_hellman(bob.public_key());
        let b = bob.diffie_hellman(alice.public_key());
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert!(a.is_contributory());
    }

    #[test]
    fn test_different_peers_different_secrets() {
        let alice = ExchangeKeypair::try_generate().unwrap();
        let bob = ExchangeKeypair::try_generate().unwrap();
        let carol = ExchangeKeypair::try_generate().unwrap();

        let ab = alice.diffie_hellman(bob.public_key());
        let ac = alice.diffie_hellman(carol.public_key());
        assert_ne!(ab.as_bytes(), ac.as_bytes());
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let kp = ExchangeKeypair::try_generate().unwrap();
        let restored = ExchangeKeypair::from_parts(kp.secret_bytes(), kp.public_key().as_bytes())
            .unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let kp = ExchangeKeypair::try_generate().unwrap();
        let other = ExchangeKeypair::try_generate().unwrap();
        assert_eq!(
            ExchangeKeypair::from_parts(kp.secret_bytes(), other.public_key().as_bytes()).err(),
            Some(CryptoError::InvalidSecretKey)
        );
    }

    #[test]
    fn test_low_order_point_is_not_contributory() {
        let kp = ExchangeKeypair::try_generate().unwrap();
        let zero = ExchangePublicKey([0u8; KEY_SIZE]);
        assert!(!kp.diffie_hellman(&zero).is_contributory());
    }
}
