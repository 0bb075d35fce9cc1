//! On-chain notarization
//!
//! Records a 32-byte content hash on a deployed `MessageLogger` contract by
//! calling `logMessage(bytes32)` through the connected wallet. Anyone holding
//! the ciphertext can later recompute the hash and compare it to the one
//! logged on chain.
//!
//! The hash covers the armored ciphertext, not the plaintext, so a third
//! party can verify it without being able to read the message.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::crypto::hash::HashOutput;
use crate::crypto::Hash;
use crate::wallet::{Address, RequestArguments, WalletError, WalletSession};

/// Signature of the logging function
pub const LOG_MESSAGE_SIGNATURE: &str = "logMessage(bytes32)";

/// Gas limit for a `logMessage` call
pub const DEFAULT_NOTARY_GAS: u64 = 100_000;

/// Default time between receipt polls
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for a transaction to be mined
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Notarization errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotaryError {
    /// No wallet account to send from, or it went away mid-call
    #[error("Wallet is not connected")]
    NotConnected,

    /// The wallet refused or failed the request
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// The call was mined but reverted
    #[error("Transaction {tx_hash} reverted")]
    Reverted {
        /// Transaction hash
        tx_hash: String,
    },

    /// The call ran out of gas
    #[error("Transaction {tx_hash} ran out of gas (limit {gas})")]
    OutOfGas {
        /// Transaction hash
        tx_hash: String,
        /// Gas limit that was exhausted
        gas: u64,
    },

    /// The transaction was not mined before the deadline
    #[error("Transaction {tx_hash} not mined within {after:?}")]
    ReceiptTimeout {
        /// Transaction hash
        tx_hash: String,
        /// Deadline
        after: Duration,
    },

    /// The provider answered with something unexpected
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl NotaryError {
    /// Whether the failure was a deadline rather than a rejection
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NotaryError::ReceiptTimeout { .. } | NotaryError::Wallet(WalletError::Timeout(_))
        )
    }
}

/// Result type for notary operations
pub type NotaryResult<T> = Result<T, NotaryError>;

/// A mined `logMessage` call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryReceipt {
    /// Transaction hash, `0x`-hex
    pub transaction_hash: String,
    /// Hash that was logged, `0x`-hex
    pub content_hash: String,
    /// Contract called
    pub contract: Address,
    /// Wallet account that sent the call
    pub from: Address,
    /// Block the call was mined in
    pub block_number: Option<u64>,
    /// Gas consumed
    pub gas_used: u64,
}

impl NotaryReceipt {
    /// Whether `ciphertext` hashes to the content hash this receipt logged
    pub fn verifies(&self, ciphertext: &str) -> bool {
        let digits = self.content_hash.strip_prefix("0x").unwrap_or(&self.content_hash);
        let mut recorded: HashOutput = [0u8; 32];
        match hex::decode_to_slice(digits, &mut recorded) {
            Ok(()) => verify_notarization(ciphertext, &recorded),
            Err(_) => false,
        }
    }
}

/// First four bytes of the Keccak-256 of a function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let digest = Hash::keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// ABI calldata for `logMessage(bytes32)`
pub fn encode_log_message(content_hash: &HashOutput) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&function_selector(LOG_MESSAGE_SIGNATURE));
    data.extend_from_slice(content_hash);
    data
}

/// Hash of an armored ciphertext as logged on chain
pub fn content_hash(ciphertext: &str) -> HashOutput {
    Hash::keccak256(ciphertext.as_bytes())
}

/// Check a ciphertext against a hash recorded on chain
pub fn verify_notarization(ciphertext: &str, recorded: &HashOutput) -> bool {
    Hash::verify_keccak(ciphertext.as_bytes(), recorded)
}

/// Client for the `MessageLogger` contract
#[derive(Clone, Debug)]
pub struct ContractNotary {
    contract: Address,
    gas: u64,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl ContractNotary {
    /// Notary for the contract at `contract`
    pub fn new(contract: Address) -> Self {
        ContractNotary {
            contract,
            gas: DEFAULT_NOTARY_GAS,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Set the gas limit
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    /// Set receipt polling
    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }

    /// Contract address
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Send `logMessage(content_hash)` from the connected account and wait
    /// until it is mined
    pub async fn log_hash(&self, wallet: &WalletSession, content_hash: &HashOutput) -> NotaryResult<NotaryReceipt> {
        let from = wallet.address().ok_or(NotaryError::NotConnected)?;
        let calldata = encode_log_message(content_hash);

        let tx = json!({
            "from": from.to_string(),
            "to": self.contract.to_string(),
            "data": format!("0x{}", hex::encode(&calldata)),
            "gas": format!("{:#x}", self.gas),
        });
        let response = wallet
            .request(RequestArguments::new("eth_sendTransaction").with_params(vec![tx]))
            .await?;
        let tx_hash = response
            .as_str()
            .ok_or_else(|| NotaryError::InvalidResponse(format!("expected transaction hash, got {response}")))?
            .to_string();

        debug!(tx = %tx_hash, contract = %self.contract, "Sent logMessage");

        let receipt = self.wait_for_receipt(wallet, &tx_hash).await?;
        let status = receipt.get("status").and_then(Value::as_str).map(parse_quantity);
        let gas_used = receipt
            .get("gasUsed")
            .and_then(Value::as_str)
            .map(parse_quantity)
            .transpose()?
            .unwrap_or(0);
        let block_number = receipt
            .get("blockNumber")
            .and_then(Value::as_str)
            .map(parse_quantity)
            .transpose()?;

        match status.transpose()? {
            Some(1) => {}
            _ if gas_used >= self.gas => {
                warn!(tx = %tx_hash, gas = self.gas, "logMessage ran out of gas");
                return Err(NotaryError::OutOfGas { tx_hash, gas: self.gas });
            }
            _ => {
                warn!(tx = %tx_hash, "logMessage reverted");
                return Err(NotaryError::Reverted { tx_hash });
            }
        }

        let content_hash = format!("0x{}", hex::encode(content_hash));
        info!(tx = %tx_hash, hash = %content_hash, "Content hash logged on chain");

        Ok(NotaryReceipt {
            transaction_hash: tx_hash,
            content_hash,
            contract: self.contract,
            from,
            block_number,
            gas_used,
        })
    }

    async fn wait_for_receipt(&self, wallet: &WalletSession, tx_hash: &str) -> NotaryResult<Value> {
        let deadline = Instant::now() + self.receipt_timeout;
        let poll = RequestArguments::new("eth_getTransactionReceipt").with_params(vec![json!(tx_hash)]);

        loop {
            if !wallet.is_connected() {
                return Err(NotaryError::NotConnected);
            }

            let receipt = wallet.request(poll.clone()).await?;
            if !receipt.is_null() {
                return Ok(receipt);
            }

            if Instant::now() + self.receipt_poll_interval > deadline {
                return Err(NotaryError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    after: self.receipt_timeout,
                });
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

fn parse_quantity(s: &str) -> NotaryResult<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| NotaryError::InvalidResponse(format!("bad quantity {s:?}")))
}
