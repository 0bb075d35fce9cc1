//! Operator credentials
//!
//! The operator is the ledger account that pays for and signs topic, file
//! and contract transactions. It is independent of the user's wallet.
//! Keys are Ed25519.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::entity::AccountId;
use super::{LedgerError, LedgerResult};

/// Size of a public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// DER prefix of an Ed25519 private key (PKCS#8), as exported by ledger portals
const DER_PRIVATE_PREFIX: &str = "302e020100300506032b657004220420";

/// DER prefix of an Ed25519 public key (SubjectPublicKeyInfo)
const DER_PUBLIC_PREFIX: &str = "302a300506032b6570032100";

/// Public half of an operator key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorPublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl OperatorPublicKey {
    /// Parse raw hex or DER-prefixed hex
    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        let s = s.trim().trim_start_matches("0x");
        let raw = s.strip_prefix(DER_PUBLIC_PREFIX).unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
        let arr: [u8; PUBLIC_KEY_SIZE] =
            bytes.as_slice().try_into().map_err(|_| {
                LedgerError::InvalidKey(format!("expected {PUBLIC_KEY_SIZE} bytes, got {}", bytes.len()))
            })?;
        Ok(OperatorPublicKey(arr))
    }

    /// Raw hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature over `message`
    pub fn verify(&self, message: &[u8], signature: &Signature) -> LedgerResult<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| LedgerError::InvalidSignature)?;
        key.verify(message, &DalekSignature::from_bytes(&signature.0))
            .map_err(|_| LedgerError::InvalidSignature)
    }
}

impl std::fmt::Debug for OperatorPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperatorPublicKey({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for OperatorPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for OperatorPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for OperatorPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 signature over a frozen transaction body
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(s).map_err(|_| LedgerError::InvalidSignature)?;
        let arr: [u8; SIGNATURE_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::InvalidSignature)?;
        Ok(Signature(arr))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

// Arrays over 32 bytes don't derive serde
impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An operator signing key
///
/// The secret key is zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct OperatorKey {
    #[zeroize(skip)]
    public_key: OperatorPublicKey,
    secret_key: [u8; SECRET_KEY_SIZE],
}

impl OperatorKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Parse raw hex or DER-prefixed hex (`302e0201...0420` + 32 bytes)
    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        let s = s.trim().trim_start_matches("0x");
        let raw = s.strip_prefix(DER_PRIVATE_PREFIX).unwrap_or(s);
        let mut bytes = hex::decode(raw).map_err(|e| LedgerError::InvalidKey(e.to_string()))?;

        let result = <[u8; SECRET_KEY_SIZE]>::try_from(bytes.as_slice())
            .map(|secret| Self::from_signing_key(SigningKey::from_bytes(&secret)))
            .map_err(|_| {
                LedgerError::InvalidKey(format!("expected {SECRET_KEY_SIZE} bytes, got {}", bytes.len()))
            });
        bytes.zeroize();
        result
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        OperatorKey {
            public_key: OperatorPublicKey(signing_key.verifying_key().to_bytes()),
            secret_key: signing_key.to_bytes(),
        }
    }

    /// Raw secret hex, for handing to a dev gateway. Handle with care.
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret_key)
    }

    /// Public half
    pub fn public_key(&self) -> &OperatorPublicKey {
        &self.public_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::from_bytes(&self.secret_key);
        Signature(signing_key.sign(message).to_bytes())
    }
}

impl Clone for OperatorKey {
    fn clone(&self) -> Self {
        OperatorKey {
            public_key: self.public_key,
            secret_key: self.secret_key,
        }
    }
}

impl std::fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperatorKey({:?})", self.public_key)
    }
}

/// An operator account and its signing key
#[derive(Clone, Debug)]
pub struct Operator {
    account: AccountId,
    key: OperatorKey,
}

impl Operator {
    /// Pair an account with its key
    pub fn new(account: AccountId, key: OperatorKey) -> Self {
        Operator { account, key }
    }

    /// Parse from the string forms used in configuration
    pub fn from_strings(account_id: &str, private_key: &str) -> LedgerResult<Self> {
        Ok(Operator::new(account_id.parse()?, OperatorKey::from_hex(private_key)?))
    }

    /// Paying account
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Signing key
    pub fn key(&self) -> &OperatorKey {
        &self.key
    }

    /// Public key transactions are verified against
    pub fn public_key(&self) -> &OperatorPublicKey {
        self.key.public_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = OperatorKey::generate();
        let sig = key.sign(b"transaction body");
        assert!(key.public_key().verify(b"transaction body", &sig).is_ok());
        assert_eq!(
            key.public_key().verify(b"other body", &sig),
            Err(LedgerError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = OperatorKey::generate();
        let b = OperatorKey::generate();
        let sig = a.sign(b"body");
        assert!(b.public_key().verify(b"body", &sig).is_err());
    }

    #[test]
    fn test_parse_raw_and_der_hex() {
        let key = OperatorKey::generate();
        let raw = key.to_hex();
        let der = format!("{DER_PRIVATE_PREFIX}{raw}");

        assert_eq!(OperatorKey::from_hex(&raw).unwrap().public_key(), key.public_key());
        assert_eq!(OperatorKey::from_hex(&der).unwrap().public_key(), key.public_key());

        let public_der = format!("{DER_PUBLIC_PREFIX}{}", key.public_key().to_hex());
        assert_eq!(&OperatorPublicKey::from_hex(&public_der).unwrap(), key.public_key());
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(matches!(OperatorKey::from_hex("zz"), Err(LedgerError::InvalidKey(_))));
        assert!(matches!(OperatorKey::from_hex("abcd"), Err(LedgerError::InvalidKey(_))));
    }

    #[test]
    fn test_operator_from_strings() {
        let key = OperatorKey::generate();
        let op = Operator::from_strings("0.0.2", &key.to_hex()).unwrap();
        assert_eq!(op.account(), AccountId::new(0, 0, 2));
        assert_eq!(op.public_key(), key.public_key());
        assert!(Operator::from_strings("2", &key.to_hex()).is_err());
    }

    #[test]
    fn test_signature_serde() {
        let key = OperatorKey::generate();
        let sig = key.sign(b"x");
        let json = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}
