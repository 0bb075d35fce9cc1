//! Crate-level errors
//!
//! Module errors convert into [`Error`] at the controller boundary. Ledger,
//! wallet and notary deadlines all surface as [`Error::TimeoutFailure`].

use std::time::Duration;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::exchange::{MessageId, MessageStatus};
use crate::ledger::LedgerError;
use crate::notary::NotaryError;
use crate::wallet::WalletError;

/// Errors surfaced by the message exchange
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No wallet provider was injected
    #[error("No wallet provider available")]
    ProviderUnavailable,

    /// The user declined a wallet prompt
    #[error("User rejected the wallet request")]
    UserRejected,

    /// Other wallet failure
    #[error("Wallet error: {0}")]
    Wallet(WalletError),

    /// Key generation or encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailure(CryptoError),

    /// Wrong key or corrupt ciphertext
    #[error("Decryption failed: {0}")]
    DecryptionFailure(CryptoError),

    /// The ledger rejected or never received the submission
    #[error("Submission failed: {0}")]
    SubmissionFailure(LedgerError),

    /// The notary call was rejected, reverted or ran out of gas
    #[error("Notarization failed: {0}")]
    NotaryFailure(NotaryError),

    /// A collaborator did not answer in time
    #[error("{operation} timed out after {after:?}")]
    TimeoutFailure {
        /// What was being waited for
        operation: &'static str,
        /// Deadline that passed
        after: Duration,
    },

    /// The message is not in a state that allows the operation
    #[error("Cannot {operation} message {id} while {status}")]
    InvalidTransition {
        /// Message
        id: MessageId,
        /// Its current status
        status: MessageStatus,
        /// Attempted operation
        operation: &'static str,
    },

    /// Encryption or decryption needs a keypair first
    #[error("No keypair has been generated")]
    MissingKeypair,

    /// Notarization needs a connected wallet
    #[error("Wallet is not connected")]
    WalletNotConnected,

    /// No notary contract configured
    #[error("No notary contract configured")]
    NotaryUnavailable,

    /// No message with this id
    #[error("Unknown message {0}")]
    UnknownMessage(MessageId),

    /// Another operation on the same message has not finished
    #[error("Message {0} has an operation in flight")]
    Busy(MessageId),

    /// No received message at this position
    #[error("No received message at position {0}")]
    UnknownReceived(usize),

    /// Bad or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<WalletError> for Error {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NoProvider => Error::ProviderUnavailable,
            WalletError::UserRejected => Error::UserRejected,
            WalletError::NotConnected => Error::WalletNotConnected,
            WalletError::Timeout(after) => Error::TimeoutFailure {
                operation: "wallet prompt",
                after,
            },
            other => Error::Wallet(other),
        }
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Timeout(after) => Error::TimeoutFailure {
                operation: "publish",
                after,
            },
            other => Error::SubmissionFailure(other),
        }
    }
}

impl From<NotaryError> for Error {
    fn from(err: NotaryError) -> Self {
        match err {
            NotaryError::ReceiptTimeout { after, .. } | NotaryError::Wallet(WalletError::Timeout(after)) => {
                Error::TimeoutFailure {
                    operation: "notarization",
                    after,
                }
            }
            other => Error::NotaryFailure(other),
        }
    }
}

/// Result type for the message exchange
pub type Result<T> = std::result::Result<T, Error>;
