//! Ledger access layer
//!
//! Every write to the ledger goes through the same two-phase model:
//! a [`Transaction`] is built, frozen and signed by the [`Operator`], and the
//! resulting [`FrozenTransaction`] is executed by a [`LedgerClient`].
//!
//! Two clients are provided:
//! - [`InMemoryLedger`] for tests and offline demos
//! - [`GatewayClient`], JSON over WebSocket to a ledger gateway
//!
//! [`LedgerLogClient`] builds topic publish and subscribe on top of either.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod entity;
pub mod gateway;
pub mod log;
pub mod memory;
pub mod operator;
pub mod transaction;

pub use entity::{AccountId, ContractId, EntityId, FileId, TopicId};
pub use gateway::GatewayClient;
pub use log::{LedgerLogClient, Subscription};
pub use memory::InMemoryLedger;
pub use operator::{Operator, OperatorKey, OperatorPublicKey, Signature};
pub use transaction::{
    FrozenTransaction, Receipt, Timestamp, Transaction, TransactionBody, TransactionId,
};

/// Ledger errors
///
/// Serializable so the gateway can forward them verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerError {
    /// Not a `shard.realm.num` identifier
    #[error("Invalid entity id: {0:?}")]
    InvalidEntityId(String),

    /// Transaction signature does not verify against the payer key
    #[error("Invalid transaction signature")]
    InvalidSignature,

    /// Payer account unknown to the ledger
    #[error("Unknown payer account {0}")]
    UnknownPayer(AccountId),

    /// Payer cannot cover the fee
    #[error("Insufficient balance on {account}: need {needed}, have {available}")]
    InsufficientBalance {
        /// Paying account
        account: AccountId,
        /// Fee required
        needed: u64,
        /// Current balance
        available: u64,
    },

    /// No such topic
    #[error("Topic {0} not found")]
    TopicNotFound(TopicId),

    /// No such file
    #[error("File {0} not found")]
    FileNotFound(FileId),

    /// Body or transaction exceeds a service limit
    #[error("Payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Actual size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Gas request above the network ceiling
    #[error("Gas {requested} exceeds limit of {max}")]
    GasLimitExceeded {
        /// Requested gas
        requested: u64,
        /// Ceiling
        max: u64,
    },

    /// Same transaction id executed twice
    #[error("Duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// No receipt within the deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Any other rejection by the service
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Operator key could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl LedgerError {
    /// Worth retrying with a fresh transaction
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A message as stored on a topic
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Topic the message was submitted to
    pub topic_id: TopicId,
    /// Position on the topic, starting at 1
    pub sequence_number: u64,
    /// When consensus was reached
    pub consensus_timestamp: Timestamp,
    /// Submitted bytes
    #[serde(with = "base64_bytes")]
    pub contents: Vec<u8>,
}

/// A ledger node or gateway
///
/// Implementations verify the signature, charge the payer and apply the body,
/// or reject the whole transaction.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Execute a frozen transaction and wait for its receipt
    async fn execute(&self, transaction: &FrozenTransaction) -> LedgerResult<Receipt>;

    /// Messages on `topic_id` with sequence number greater than `after`,
    /// oldest first, at most `limit` of them
    async fn topic_messages(
        &self,
        topic_id: &TopicId,
        after: u64,
        limit: usize,
    ) -> LedgerResult<Vec<TopicMessage>>;
}

/// Serde adapter for binary fields carried as base64 text
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(LedgerError::Network("reset".into()).is_transient());
        assert!(LedgerError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!LedgerError::InvalidSignature.is_transient());
        assert!(!LedgerError::TopicNotFound(TopicId::new(0, 0, 1)).is_transient());
    }

    #[test]
    fn test_topic_message_contents_are_base64() {
        let msg = TopicMessage {
            topic_id: TopicId::new(0, 0, 7),
            sequence_number: 1,
            consensus_timestamp: Timestamp { seconds: 1, nanos: 2 },
            contents: b"hello".to_vec(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"aGVsbG8=\""));
        assert!(json.contains("\"0.0.7\""));
        let back: TopicMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_errors_survive_json() {
        let err = LedgerError::InsufficientBalance {
            account: AccountId::new(0, 0, 2),
            needed: 10,
            available: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(serde_json::from_str::<LedgerError>(&json).unwrap(), err);
    }
}
