//! Message sealing to a recipient public key
//!
//! Envelope layout (before armoring):
//!
//! ```text
//! version (1) || ephemeral_public (32) || nonce (12) || ciphertext || tag (16)
//! ```
//!
//! The symmetric key is derived from the X25519 agreement between a fresh
//! ephemeral secret and the recipient key, bound to both public keys. The
//! same bytes are authenticated as AAD, so a ciphertext opened with any other
//! private key fails the tag check instead of yielding garbage.

use zeroize::Zeroizing;

use super::armor::{self, ArmorKind};
use super::cipher::{Cipher, NONCE_SIZE, TAG_SIZE};
use super::error::{CryptoError, CryptoResult};
use super::exchange::{ExchangeKeypair, ExchangePublicKey, SharedSecret, KEY_SIZE};
use super::hash::Hash;
use super::keyring::{public_key_from_armor, secret_key_from_armor};

/// Current envelope version
pub const ENVELOPE_VERSION: u8 = 1;

const KDF_CONTEXT: &str = "courier message envelope v1 chacha20poly1305";
const HEADER_SIZE: usize = 1 + KEY_SIZE;

/// Async facade over [`seal`] and [`open`].
///
/// Work runs on the blocking pool so callers on the async runtime are not
/// stalled by key agreement. The codec holds no key material; keys are
/// borrowed per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Create a codec
    pub fn new() -> Self {
        MessageCodec
    }

    /// Encrypt `plaintext` to an armored recipient public key
    pub async fn encrypt(&self, plaintext: &str, recipient_public_key: &str) -> CryptoResult<String> {
        let plaintext = Zeroizing::new(plaintext.to_owned());
        let recipient = recipient_public_key.to_owned();

        tokio::task::spawn_blocking(move || seal(&plaintext, &recipient))
            .await
            .map_err(|e| CryptoError::TaskAborted(e.to_string()))?
    }

    /// Decrypt an armored ciphertext with an armored private key
    pub async fn decrypt(&self, ciphertext: &str, recipient_private_key: &str) -> CryptoResult<String> {
        let ciphertext = ciphertext.to_owned();
        let private_key = Zeroizing::new(recipient_private_key.to_owned());

        tokio::task::spawn_blocking(move || open(&ciphertext, &private_key))
            .await
            .map_err(|e| CryptoError::TaskAborted(e.to_string()))?
    }
}

/// Seal `plaintext` for the holder of `recipient_public_key`
pub fn seal(plaintext: &str, recipient_public_key: &str) -> CryptoResult<String> {
    let recipient = public_key_from_armor(recipient_public_key)?;
    let ephemeral = ExchangeKeypair::try_generate()?;

    let shared = ephemeral.diffie_hellman(&recipient);
    if !shared.is_contributory() {
        return Err(CryptoError::EncryptionFailed(
            "recipient key is a low-order point".to_string(),
        ));
    }

    let header = envelope_header(ephemeral.public_key());
    let key = derive_message_key(&shared, ephemeral.public_key(), &recipient);
    let sealed = Cipher::seal(&key, plaintext.as_bytes(), &aad(&header, &recipient))?;

    let mut envelope = Vec::with_capacity(HEADER_SIZE + sealed.len());
    envelope.extend_from_slice(&header);
    envelope.extend_from_slice(&sealed);

    let version = ENVELOPE_VERSION.to_string();
    let fingerprint = recipient.fingerprint();
    Ok(armor::encode(
        ArmorKind::Message,
        &[("Version", version.as_str()), ("Recipient", fingerprint.as_str())],
        &envelope,
    ))
}

/// Open a ciphertext produced by [`seal`]
pub fn open(ciphertext: &str, recipient_private_key: &str) -> CryptoResult<String> {
    let armored = armor::decode_kind(ciphertext, ArmorKind::Message)?;
    let envelope = armored.data;

    if envelope.len() < HEADER_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext(format!(
            "envelope is {} bytes",
            envelope.len()
        )));
    }
    if envelope[0] != ENVELOPE_VERSION {
        return Err(CryptoError::UnsupportedVersion(envelope[0]));
    }

    let (header, sealed) = envelope.split_at(HEADER_SIZE);
    let ephemeral = ExchangePublicKey::from_bytes(&header[1..])?;

    let keypair = secret_key_from_armor(recipient_private_key)?;
    let shared = keypair.diffie_hellman(&ephemeral);
    if !shared.is_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let key = derive_message_key(&shared, &ephemeral, keypair.public_key());
    let plaintext = Zeroizing::new(Cipher::open(&key, sealed, &aad(header, keypair.public_key()))?);

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::MalformedCiphertext("plaintext is not UTF-8".to_string()))
}

fn envelope_header(ephemeral: &ExchangePublicKey) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = ENVELOPE_VERSION;
    header[1..].copy_from_slice(ephemeral.as_bytes());
    header
}

fn aad(header: &[u8], recipient: &ExchangePublicKey) -> Vec<u8> {
    let mut aad = Vec::with_capacity(header.len() + KEY_SIZE);
    aad.extend_from_slice(header);
    aad.extend_from_slice(recipient.as_bytes());
    aad
}

fn derive_message_key(
    shared: &SharedSecret,
    ephemeral: &ExchangePublicKey,
    recipient: &ExchangePublicKey,
) -> Zeroizing<[u8; 32]> {
    let mut material = Zeroizing::new([0u8; KEY_SIZE * 3]);
    material[..KEY_SIZE].copy_from_slice(shared.as_bytes());
    material[KEY_SIZE..KEY_SIZE * 2].copy_from_slice(ephemeral.as_bytes());
    material[KEY_SIZE * 2..].copy_from_slice(recipient.as_bytes());
    Zeroizing::new(Hash::derive_key(KDF_CONTEXT, &material[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keyring::KeyringManager;
    use proptest::prelude::*;

    fn keypair(hint: &str) -> std::sync::Arc<crate::crypto::Keypair> {
        KeyringManager::new().generate_keypair(hint).unwrap()
    }

    #[tokio::test]
    async fn test_encrypt_decrypt() {
        let kp = keypair("alice");
        let codec = MessageCodec::new();

        let ciphertext = codec.encrypt("hello", kp.public_key()).await.unwrap();
        assert!(!ciphertext.is_empty());
        assert_ne!(ciphertext, "hello");
        assert!(ciphertext.contains("BEGIN COURIER MESSAGE"));

        let plaintext = codec.decrypt(&ciphertext, kp.private_key()).await.unwrap();
        assert_eq!(plaintext, "hello");
    }

    #[tokio::test]
    async fn test_wrong_keypair_fails() {
        let alice = keypair("alice");
        let mallory = keypair("mallory");
        let codec = MessageCodec::new();

        let ciphertext = codec.encrypt("for alice", alice.public_key()).await.unwrap();
        assert_eq!(
            codec.decrypt(&ciphertext, mallory.private_key()).await,
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_ciphertexts_are_randomized() {
        let kp = keypair("alice");
        let a = seal("same", kp.public_key()).unwrap();
        let b = seal("same", kp.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_inputs() {
        let kp = keypair("alice");
        assert!(matches!(
            open("not armored", kp.private_key()),
            Err(CryptoError::MalformedArmor(_))
        ));
        // A public key block is not a message
        assert!(open(kp.public_key(), kp.private_key()).is_err());

        let short = armor::encode(ArmorKind::Message, &[], &[ENVELOPE_VERSION; 10]);
        assert!(matches!(
            open(&short, kp.private_key()),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_unknown_version() {
        let kp = keypair("alice");
        let ciphertext = seal("hi", kp.public_key()).unwrap();
        let mut envelope = armor::decode(&ciphertext).unwrap().data;
        envelope[0] = 9;
        let rewrapped = armor::encode(ArmorKind::Message, &[], &envelope);
        assert_eq!(
            open(&rewrapped, kp.private_key()),
            Err(CryptoError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_tampered_body_fails() {
        let kp = keypair("alice");
        let ciphertext = seal("integrity", kp.public_key()).unwrap();
        let mut envelope = armor::decode(&ciphertext).unwrap().data;
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        let rewrapped = armor::encode(ArmorKind::Message, &[], &envelope);
        assert_eq!(open(&rewrapped, kp.private_key()), Err(CryptoError::DecryptionFailed));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decrypt_inverts_encrypt(plaintext in ".{0,256}") {
            let kp = keypair("prop");
            let ciphertext = seal(&plaintext, kp.public_key()).unwrap();
            prop_assert_eq!(open(&ciphertext, kp.private_key()).unwrap(), plaintext);
        }
    }
}
