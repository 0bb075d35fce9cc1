//! Session keypair ownership
//!
//! The keyring holds at most one keypair. Generating a new one replaces the
//! old one, after which ciphertexts sealed to the old public key can no longer
//! be opened in this session.

use std::sync::Arc;

use tracing::info;
use zeroize::Zeroizing;

use super::armor::{self, ArmorKind};
use super::error::{CryptoError, CryptoResult};
use super::exchange::{ExchangeKeypair, ExchangePublicKey, KEY_SIZE};

/// Armor header carrying the identity hint
pub const USER_ID_HEADER: &str = "User-Id";

/// An armored keypair
pub struct Keypair {
    user_id: String,
    fingerprint: String,
    public_key: String,
    private_key: Zeroizing<String>,
}

impl Keypair {
    fn from_exchange(keypair: &ExchangeKeypair, user_id: &str) -> Self {
        let public_key = armor::encode(
            ArmorKind::PublicKey,
            &[(USER_ID_HEADER, user_id)],
            keypair.public_key().as_bytes(),
        );

        let mut secret = Zeroizing::new(Vec::with_capacity(KEY_SIZE * 2));
        secret.extend_from_slice(keypair.secret_bytes());
        secret.extend_from_slice(keypair.public_key().as_bytes());
        let private_key = Zeroizing::new(armor::encode(
            ArmorKind::PrivateKey,
            &[(USER_ID_HEADER, user_id)],
            &secret,
        ));

        Keypair {
            user_id: user_id.to_string(),
            fingerprint: keypair.public_key().fingerprint(),
            public_key,
            private_key,
        }
    }

    /// Rebuild from an armored private key (public half is derived from it)
    pub fn from_private_armor(text: &str) -> CryptoResult<Self> {
        let armored = armor::decode_kind(text, ArmorKind::PrivateKey)?;
        let user_id = armored.header(USER_ID_HEADER).unwrap_or_default().to_string();
        let keypair = secret_key_from_armor(text)?;
        Ok(Self::from_exchange(&keypair, &user_id))
    }

    /// Identity hint the keypair was generated for
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Short hex fingerprint of the public key
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Armored public key
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Armored private key. Never log this.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("user_id", &self.user_id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Owner of the session keypair
#[derive(Default)]
pub struct KeyringManager {
    active: Option<Arc<Keypair>>,
}

impl KeyringManager {
    /// Create an empty keyring
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh X25519 keypair for `identity_hint`, replacing any
    /// previously held keypair. Hints containing control characters are
    /// rejected and leave the keyring untouched.
    pub fn generate_keypair(&mut self, identity_hint: &str) -> CryptoResult<Arc<Keypair>> {
        if identity_hint.chars().any(char::is_control) {
            return Err(CryptoError::InvalidIdentityHint(identity_hint.escape_debug().to_string()));
        }
        let exchange = ExchangeKeypair::try_generate()?;
        let keypair = Arc::new(Keypair::from_exchange(&exchange, identity_hint));

        if let Some(old) = self.active.replace(keypair.clone()) {
            info!(
                old = %old.fingerprint(),
                new = %keypair.fingerprint(),
                "Replaced session keypair; ciphertexts for the old key can no longer be decrypted"
            );
        } else {
            info!(fingerprint = %keypair.fingerprint(), "Generated session keypair");
        }

        Ok(keypair)
    }

    /// Install an existing keypair, replacing any previously held one
    pub fn install(&mut self, keypair: Keypair) -> Arc<Keypair> {
        let keypair = Arc::new(keypair);
        self.active = Some(keypair.clone());
        keypair
    }

    /// The active keypair, if any
    pub fn current(&self) -> Option<Arc<Keypair>> {
        self.active.clone()
    }
}

/// Parse an armored public key
pub fn public_key_from_armor(text: &str) -> CryptoResult<ExchangePublicKey> {
    let armored = armor::decode_kind(text, ArmorKind::PublicKey)?;
    ExchangePublicKey::from_bytes(&armored.data).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Parse an armored private key, checking its embedded public half
pub fn secret_key_from_armor(text: &str) -> CryptoResult<ExchangeKeypair> {
    let armored = armor::decode_kind(text, ArmorKind::PrivateKey)?;
    let data = Zeroizing::new(armored.data);
    if data.len() != KEY_SIZE * 2 {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE * 2,
            actual: data.len(),
        });
    }
    let (secret, public) = data.split_at(KEY_SIZE);
    ExchangeKeypair::from_parts(secret, public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_replaces_previous() {
        let mut keyring = KeyringManager::new();
        assert!(keyring.current().is_none());

        let first = keyring.generate_keypair("User <user@example.com>").unwrap();
        let second = keyring.generate_keypair("User <user@example.com>").unwrap();

        assert_ne!(first.public_key(), second.public_key());
        let current = keyring.current().unwrap();
        assert_eq!(current.public_key(), second.public_key());
    }

    #[test]
    fn test_generate_rejects_multiline_hint() {
        let mut keyring = KeyringManager::new();
        let first = keyring.generate_keypair("alice").unwrap();

        assert!(matches!(
            keyring.generate_keypair("Alice\nBob"),
            Err(CryptoError::InvalidIdentityHint(_))
        ));
        assert!(matches!(
            keyring.generate_keypair("Alice\r"),
            Err(CryptoError::InvalidIdentityHint(_))
        ));
        assert_eq!(keyring.current().unwrap().public_key(), first.public_key());
    }

    #[test]
    fn test_private_armor_round_trips_hint() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("Alice <alice@example.com>").unwrap();

        let restored = Keypair::from_private_armor(kp.private_key()).unwrap();
        assert_eq!(restored.user_id(), "Alice <alice@example.com>");
        assert_eq!(restored.fingerprint(), kp.fingerprint());
        assert!(public_key_from_armor(restored.public_key()).is_ok());
    }

    #[test]
    fn test_armor_headers_carry_hint() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("alice").unwrap();

        assert!(kp.public_key().contains("BEGIN COURIER PUBLIC KEY"));
        assert!(kp.public_key().contains("User-Id: alice"));
        assert!(kp.private_key().contains("BEGIN COURIER PRIVATE KEY"));
        assert_eq!(kp.user_id(), "alice");
    }

    #[test]
    fn test_parse_armored_keys() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("alice").unwrap();

        let public = public_key_from_armor(kp.public_key()).unwrap();
        let secret = secret_key_from_armor(kp.private_key()).unwrap();
        assert_eq!(&public, secret.public_key());
        assert_eq!(public.fingerprint(), kp.fingerprint());
    }

    #[test]
    fn test_public_armor_is_not_a_private_key() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("alice").unwrap();
        assert!(secret_key_from_armor(kp.public_key()).is_err());
        assert!(public_key_from_armor(kp.private_key()).is_err());
    }

    #[test]
    fn test_reload_private_armor() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("bob").unwrap();

        let reloaded = Keypair::from_private_armor(kp.private_key()).unwrap();
        assert_eq!(reloaded.public_key(), kp.public_key());
        assert_eq!(reloaded.user_id(), "bob");

        let mut other = KeyringManager::new();
        other.install(reloaded);
        assert_eq!(other.current().unwrap().fingerprint(), kp.fingerprint());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let mut keyring = KeyringManager::new();
        let kp = keyring.generate_keypair("alice").unwrap();
        let debug = format!("{:?}", kp);
        assert!(!debug.contains("PRIVATE"));
    }
}
