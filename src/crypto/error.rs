//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The provided key has an invalid length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Key generation failed in the underlying library
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Encryption operation failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed - wrong key, or the ciphertext was tampered with
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// Armored text could not be parsed
    #[error("Malformed armor: {0}")]
    MalformedArmor(String),

    /// Identity hint cannot be carried in an armor header
    #[error("Invalid identity hint: {0}")]
    InvalidIdentityHint(String),

    /// Ciphertext envelope could not be parsed
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Ciphertext envelope version is not understood
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// The public key format is invalid
    #[error("Invalid public key format")]
    InvalidPublicKey,

    /// The secret key format is invalid, or does not match its public half
    #[error("Invalid secret key format")]
    InvalidSecretKey,

    /// Background crypto task did not complete
    #[error("Crypto task aborted: {0}")]
    TaskAborted(String),
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
