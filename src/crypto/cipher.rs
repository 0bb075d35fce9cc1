//! ChaCha20-Poly1305 AEAD
//!
//! Symmetric layer underneath the message envelope. Output layout is
//! `nonce || ciphertext || tag`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use super::error::{CryptoError, CryptoResult};

/// Size of the encryption key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric cipher for sealing and opening payloads
pub struct Cipher;

impl Cipher {
    /// Seal `plaintext` under `key`, authenticating `aad` alongside it.
    ///
    /// A fresh random nonce is generated and prepended to the output.
    pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(key.into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a payload produced by [`Cipher::seal`].
    ///
    /// The AAD must match what was used when sealing.
    pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedCiphertext(format!(
                "sealed payload is {} bytes, minimum is {}",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let cipher = ChaCha20Poly1305::new(key.into());
        let (nonce_bytes, body) = sealed.split_at(NONCE_SIZE);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: body, aad })
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = [42u8; KEY_SIZE];
        let sealed = Cipher::seal(&key, b"Hello, topic!", b"").unwrap();
        let opened = Cipher::open(&key, &sealed, b"").unwrap();
        assert_eq!(opened, b"Hello, topic!");
    }

    #[test]
    fn test_nonce_differs_each_time() {
        let key = [42u8; KEY_SIZE];
        let a = Cipher::seal(&key, b"Hello", b"").unwrap();
        let b = Cipher::seal(&key, b"Hello", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = Cipher::seal(&[1u8; KEY_SIZE], b"Secret", b"").unwrap();
        assert_eq!(
            Cipher::open(&[2u8; KEY_SIZE], &sealed, b""),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_aad_is_bound() {
        let key = [7u8; KEY_SIZE];
        let sealed = Cipher::seal(&key, b"body", b"header").unwrap();

        assert!(Cipher::open(&key, &sealed, b"header").is_ok());
        assert!(Cipher::open(&key, &sealed, b"other").is_err());
    }

    #[test]
    fn test_tampered_fails() {
        let key = [42u8; KEY_SIZE];
        let mut sealed = Cipher::seal(&key, b"Hello", b"").unwrap();
        sealed[NONCE_SIZE + 1] ^= 0xFF;
        assert!(Cipher::open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn test_truncated_is_malformed() {
        let key = [42u8; KEY_SIZE];
        assert!(matches!(
            Cipher::open(&key, &[0u8; 10], b""),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }
}
