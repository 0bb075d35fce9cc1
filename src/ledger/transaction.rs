//! Transactions and receipts
//!
//! A [`Transaction`] is a mutable builder. Freezing it with an operator fixes
//! the transaction id, payer and body, and signs the canonical encoding of
//! those fields. The resulting [`FrozenTransaction`] exposes no setters, so
//! anything that changes after signing is caught by signature verification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::entity::{AccountId, ContractId, FileId, TopicId};
use super::operator::{Operator, OperatorPublicKey, Signature};
use super::{base64_bytes, LedgerError, LedgerResult};

/// Largest file create or append body the file service accepts
pub const MAX_FILE_CHUNK: usize = 4096;

/// Largest signed transaction body
pub const MAX_TRANSACTION_SIZE: usize = 6144;

/// Largest memo
pub const MAX_MEMO_SIZE: usize = 100;

/// Network gas ceiling for a single contract transaction
pub const MAX_CONTRACT_GAS: u64 = 15_000_000;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Consensus or valid-start time, in seconds and nanoseconds since the epoch
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds
    pub seconds: u64,
    /// Nanoseconds within the second
    pub nanos: u32,
}

impl Timestamp {
    /// Current time, strictly increasing across calls in this process
    ///
    /// Transaction ids are derived from this, so two transactions frozen in
    /// the same nanosecond still get distinct ids.
    pub fn now() -> Self {
        static LAST: AtomicU64 = AtomicU64::new(0);

        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut prev = LAST.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return Self::from_nanos(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// From nanoseconds since the epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Timestamp {
            seconds: nanos / NANOS_PER_SECOND,
            nanos: (nanos % NANOS_PER_SECOND) as u32,
        }
    }

    /// Nanoseconds since the epoch
    pub fn as_nanos(&self) -> u64 {
        self.seconds * NANOS_PER_SECOND + self.nanos as u64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// Payer plus valid-start time; unique per transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct TransactionId {
    /// Paying account
    pub payer: AccountId,
    /// Time the transaction was frozen
    pub valid_start: Timestamp,
}

impl TransactionId {
    /// New id for `payer` at the current time
    pub fn generate(payer: AccountId) -> Self {
        TransactionId {
            payer,
            valid_start: Timestamp::now(),
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.payer, self.valid_start)
    }
}

/// What a transaction does
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionBody {
    /// Create a topic
    TopicCreate {
        /// Topic memo
        memo: String,
    },
    /// Append a message to a topic
    TopicMessageSubmit {
        /// Target topic
        topic_id: TopicId,
        /// Message bytes
        #[serde(with = "base64_bytes")]
        message: Vec<u8>,
    },
    /// Create a file with initial contents
    FileCreate {
        /// Keys allowed to modify the file
        keys: Vec<OperatorPublicKey>,
        /// First chunk
        #[serde(with = "base64_bytes")]
        contents: Vec<u8>,
    },
    /// Append to an existing file
    FileAppend {
        /// Target file
        file_id: FileId,
        /// Next chunk
        #[serde(with = "base64_bytes")]
        contents: Vec<u8>,
    },
    /// Instantiate a contract from bytecode stored in a file
    ContractCreate {
        /// File holding the bytecode (hex text)
        bytecode_file_id: FileId,
        /// Gas ceiling for the constructor
        gas: u64,
    },
}

impl TransactionBody {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TransactionBody::TopicCreate { .. } => "TopicCreate",
            TransactionBody::TopicMessageSubmit { .. } => "TopicMessageSubmit",
            TransactionBody::FileCreate { .. } => "FileCreate",
            TransactionBody::FileAppend { .. } => "FileAppend",
            TransactionBody::ContractCreate { .. } => "ContractCreate",
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        match self {
            TransactionBody::TopicCreate { memo } => check_memo(memo),
            TransactionBody::FileCreate { contents, .. }
            | TransactionBody::FileAppend { contents, .. } => {
                if contents.len() > MAX_FILE_CHUNK {
                    return Err(LedgerError::PayloadTooLarge {
                        size: contents.len(),
                        max: MAX_FILE_CHUNK,
                    });
                }
                Ok(())
            }
            TransactionBody::ContractCreate { gas, .. } => {
                if *gas > MAX_CONTRACT_GAS {
                    return Err(LedgerError::GasLimitExceeded {
                        requested: *gas,
                        max: MAX_CONTRACT_GAS,
                    });
                }
                Ok(())
            }
            TransactionBody::TopicMessageSubmit { .. } => Ok(()),
        }
    }

    fn write_canonical(&self, bytes: &mut Vec<u8>) {
        match self {
            TransactionBody::TopicCreate { memo } => {
                bytes.push(0x01);
                write_field(bytes, memo.as_bytes());
            }
            TransactionBody::TopicMessageSubmit { topic_id, message } => {
                bytes.push(0x02);
                bytes.extend_from_slice(&topic_id.entity().to_le_bytes());
                write_field(bytes, message);
            }
            TransactionBody::FileCreate { keys, contents } => {
                bytes.push(0x10);
                bytes.extend_from_slice(&(keys.len() as u32).to_le_bytes());
                for key in keys {
                    bytes.extend_from_slice(&key.0);
                }
                write_field(bytes, contents);
            }
            TransactionBody::FileAppend { file_id, contents } => {
                bytes.push(0x11);
                bytes.extend_from_slice(&file_id.entity().to_le_bytes());
                write_field(bytes, contents);
            }
            TransactionBody::ContractCreate { bytecode_file_id, gas } => {
                bytes.push(0x20);
                bytes.extend_from_slice(&bytecode_file_id.entity().to_le_bytes());
                bytes.extend_from_slice(&gas.to_le_bytes());
            }
        }
    }
}

fn check_memo(memo: &str) -> LedgerResult<()> {
    if memo.len() > MAX_MEMO_SIZE {
        return Err(LedgerError::PayloadTooLarge {
            size: memo.len(),
            max: MAX_MEMO_SIZE,
        });
    }
    Ok(())
}

fn write_field(bytes: &mut Vec<u8>, field: &[u8]) {
    bytes.extend_from_slice(&(field.len() as u32).to_le_bytes());
    bytes.extend_from_slice(field);
}

/// An unsigned transaction under construction
#[derive(Clone, Debug)]
pub struct Transaction {
    body: TransactionBody,
    memo: String,
}

impl Transaction {
    /// Wrap a body
    pub fn new(body: TransactionBody) -> Self {
        Transaction {
            body,
            memo: String::new(),
        }
    }

    /// Create a topic
    pub fn topic_create(memo: impl Into<String>) -> Self {
        Self::new(TransactionBody::TopicCreate { memo: memo.into() })
    }

    /// Submit a message to a topic
    pub fn topic_message_submit(topic_id: TopicId, message: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionBody::TopicMessageSubmit {
            topic_id,
            message: message.into(),
        })
    }

    /// Create a file
    pub fn file_create(keys: Vec<OperatorPublicKey>, contents: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionBody::FileCreate {
            keys,
            contents: contents.into(),
        })
    }

    /// Append to a file
    pub fn file_append(file_id: FileId, contents: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionBody::FileAppend {
            file_id,
            contents: contents.into(),
        })
    }

    /// Instantiate a contract
    pub fn contract_create(bytecode_file_id: FileId, gas: u64) -> Self {
        Self::new(TransactionBody::ContractCreate {
            bytecode_file_id,
            gas,
        })
    }

    /// Attach a transaction memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    /// The body
    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    /// Fix the id and payer, then sign with the operator key
    ///
    /// Limits are checked here so an oversize body never reaches the network.
    pub fn freeze_with(self, operator: &Operator) -> LedgerResult<FrozenTransaction> {
        check_memo(&self.memo)?;
        self.body.validate()?;

        let transaction_id = TransactionId::generate(operator.account());
        let body_bytes = canonical_bytes(&transaction_id, &self.memo, &self.body);
        if body_bytes.len() > MAX_TRANSACTION_SIZE {
            return Err(LedgerError::PayloadTooLarge {
                size: body_bytes.len(),
                max: MAX_TRANSACTION_SIZE,
            });
        }

        let signature = operator.key().sign(&body_bytes);

        Ok(FrozenTransaction {
            transaction_id,
            memo: self.memo,
            body: self.body,
            signer: *operator.public_key(),
            signature,
        })
    }
}

fn canonical_bytes(transaction_id: &TransactionId, memo: &str, body: &TransactionBody) -> Vec<u8> {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&transaction_id.payer.entity().to_le_bytes());
    bytes.extend_from_slice(&transaction_id.valid_start.seconds.to_le_bytes());
    bytes.extend_from_slice(&transaction_id.valid_start.nanos.to_le_bytes());
    write_field(&mut bytes, memo.as_bytes());
    body.write_canonical(&mut bytes);

    bytes
}

/// A signed, immutable transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenTransaction {
    transaction_id: TransactionId,
    memo: String,
    body: TransactionBody,
    signer: OperatorPublicKey,
    signature: Signature,
}

impl FrozenTransaction {
    /// Transaction id
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Memo
    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// Body
    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    /// Key that signed the body
    pub fn signer(&self) -> &OperatorPublicKey {
        &self.signer
    }

    /// Canonical encoding the signature covers
    pub fn body_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.transaction_id, &self.memo, &self.body)
    }

    /// Check the signature against the embedded signer
    pub fn verify_signature(&self) -> LedgerResult<()> {
        self.signer.verify(&self.body_bytes(), &self.signature)
    }
}

/// Confirmation that a transaction reached consensus
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction this receipt is for
    pub transaction_id: TransactionId,
    /// Consensus time
    pub consensus_timestamp: Timestamp,
    /// Topic created by a `TopicCreate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<TopicId>,
    /// Sequence number assigned by a `TopicMessageSubmit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_sequence_number: Option<u64>,
    /// File created by a `FileCreate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    /// Contract created by a `ContractCreate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<ContractId>,
}

impl Receipt {
    /// Receipt with no created entity
    pub fn new(transaction_id: TransactionId, consensus_timestamp: Timestamp) -> Self {
        Receipt {
            transaction_id,
            consensus_timestamp,
            topic_id: None,
            topic_sequence_number: None,
            file_id: None,
            contract_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::operator::OperatorKey;

    fn operator() -> Operator {
        Operator::new(AccountId::new(0, 0, 2), OperatorKey::generate())
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut prev = Timestamp::now();
        for _ in 0..1000 {
            let next = Timestamp::now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_nanos(1_700_000_000_000_000_042);
        assert_eq!(ts.to_string(), "1700000000.000000042");
        assert_eq!(ts.as_nanos(), 1_700_000_000_000_000_042);
    }

    #[test]
    fn test_freeze_signs_body() {
        let op = operator();
        let frozen = Transaction::topic_message_submit(TopicId::new(0, 0, 9), b"hi".to_vec())
            .with_memo("courier")
            .freeze_with(&op)
            .unwrap();

        assert_eq!(frozen.transaction_id().payer, op.account());
        assert_eq!(frozen.signer(), op.public_key());
        assert_eq!(frozen.memo(), "courier");
        assert!(frozen.verify_signature().is_ok());
        assert!(frozen.transaction_id().to_string().starts_with("0.0.2@"));
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let op = operator();
        let frozen = Transaction::topic_message_submit(TopicId::new(0, 0, 9), b"original".to_vec())
            .freeze_with(&op)
            .unwrap();

        // Frozen transactions have no setters; tampering means re-serializing
        let mut json: serde_json::Value = serde_json::to_value(&frozen).unwrap();
        json["body"]["message"] = serde_json::Value::String("Zm9yZ2Vk".to_string());
        let tampered: FrozenTransaction = serde_json::from_value(json).unwrap();

        assert_eq!(tampered.verify_signature(), Err(LedgerError::InvalidSignature));
    }

    #[test]
    fn test_distinct_ids() {
        let op = operator();
        let a = Transaction::topic_create("").freeze_with(&op).unwrap();
        let b = Transaction::topic_create("").freeze_with(&op).unwrap();
        assert_ne!(a.transaction_id(), b.transaction_id());
    }

    #[test]
    fn test_oversize_file_append_rejected() {
        let op = operator();
        let result = Transaction::file_append(FileId::new(0, 0, 5), vec![0u8; MAX_FILE_CHUNK + 1])
            .freeze_with(&op);
        assert_eq!(
            result.unwrap_err(),
            LedgerError::PayloadTooLarge {
                size: MAX_FILE_CHUNK + 1,
                max: MAX_FILE_CHUNK
            }
        );

        assert!(Transaction::file_append(FileId::new(0, 0, 5), vec![0u8; MAX_FILE_CHUNK])
            .freeze_with(&op)
            .is_ok());
    }

    #[test]
    fn test_gas_ceiling() {
        let op = operator();
        let result = Transaction::contract_create(FileId::new(0, 0, 5), MAX_CONTRACT_GAS + 1)
            .freeze_with(&op);
        assert!(matches!(result, Err(LedgerError::GasLimitExceeded { .. })));
    }

    #[test]
    fn test_memo_limit() {
        let op = operator();
        let result = Transaction::topic_create("x".repeat(MAX_MEMO_SIZE + 1)).freeze_with(&op);
        assert!(matches!(result, Err(LedgerError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_receipt_omits_absent_entities() {
        let op = operator();
        let receipt = Receipt::new(TransactionId::generate(op.account()), Timestamp::now());
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(!json.contains("topic_id"));
        assert_eq!(serde_json::from_str::<Receipt>(&json).unwrap(), receipt);
    }
}
