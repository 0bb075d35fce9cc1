//! Development wallet
//!
//! An in-process [`WalletProvider`] that approves every prompt and mines
//! every transaction, for the demo command and tests. Rejections, reverts,
//! out-of-gas results, slow prompts and slow mining can all be switched on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::{json, Value};

use crate::crypto::Hash;

use super::address::Address;
use super::provider::{ProviderRpcError, RequestArguments, WalletProvider};

/// JSON-RPC "invalid params"
const INVALID_PARAMS: i64 = -32602;

/// Chain id reported by `eth_chainId` (ledger testnet)
pub const DEV_CHAIN_ID: u64 = 296;

/// Gas charged for a successful call
const BASE_GAS_USED: u64 = 24_000;

/// A transaction sent through the wallet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    /// Transaction hash, `0x`-hex
    pub hash: String,
    /// Sender
    pub from: Address,
    /// Contract called
    pub to: Address,
    /// Calldata
    pub data: Vec<u8>,
    /// Gas limit
    pub gas: u64,
}

struct PendingReceipt {
    status: bool,
    gas_used: u64,
    block_number: u64,
    polls_left: u32,
}

#[derive(Default)]
struct DevState {
    reject_connections: bool,
    reject_transactions: bool,
    revert: bool,
    out_of_gas: bool,
    confirmation_polls: u32,
    latency: Option<Duration>,
    sent: Vec<SentTransaction>,
    receipts: HashMap<String, PendingReceipt>,
    requests: HashMap<String, usize>,
    block_number: u64,
}

/// Auto-approving wallet with a single account
pub struct DevWallet {
    account: Address,
    state: Mutex<DevState>,
}

impl DevWallet {
    /// Wallet with a random account
    pub fn new() -> Self {
        let mut bytes = [0u8; 20];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::with_account(Address(bytes))
    }

    /// Wallet with a fixed account
    pub fn with_account(account: Address) -> Self {
        DevWallet {
            account,
            state: Mutex::new(DevState::default()),
        }
    }

    /// The wallet's account
    pub fn account(&self) -> Address {
        self.account
    }

    /// Decline `eth_requestAccounts` with code 4001
    pub fn reject_connections(&self, reject: bool) {
        self.state.lock().reject_connections = reject;
    }

    /// Decline `eth_sendTransaction` with code 4001
    pub fn reject_transactions(&self, reject: bool) {
        self.state.lock().reject_transactions = reject;
    }

    /// Mine transactions with status 0
    pub fn revert_transactions(&self, revert: bool) {
        self.state.lock().revert = revert;
    }

    /// Mine transactions with status 0 and all gas consumed
    pub fn exhaust_gas(&self, out_of_gas: bool) {
        self.state.lock().out_of_gas = out_of_gas;
    }

    /// Number of receipt polls that return `null` before a transaction is mined
    pub fn set_confirmation_polls(&self, polls: u32) {
        self.state.lock().confirmation_polls = polls;
    }

    /// Delay every request
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Transactions sent so far
    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    /// How many times `method` was requested
    pub fn request_count(&self, method: &str) -> usize {
        self.state.lock().requests.get(method).copied().unwrap_or(0)
    }

    fn send_transaction(&self, params: &[Value]) -> Result<Value, ProviderRpcError> {
        let tx = params
            .first()
            .ok_or_else(|| ProviderRpcError::new(INVALID_PARAMS, "missing transaction object"))?;

        let field = |name: &str| -> Result<&str, ProviderRpcError> {
            tx.get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderRpcError::new(INVALID_PARAMS, format!("missing field {name}")))
        };
        let bad = |e: String| ProviderRpcError::new(INVALID_PARAMS, e);

        let from: Address = field("from")?.parse().map_err(|e: super::WalletError| bad(e.to_string()))?;
        if from != self.account {
            return Err(ProviderRpcError::new(ProviderRpcError::UNAUTHORIZED, "unknown sender"));
        }
        let to: Address = field("to")?.parse().map_err(|e: super::WalletError| bad(e.to_string()))?;
        let data = hex::decode(field("data")?.trim_start_matches("0x")).map_err(|e| bad(e.to_string()))?;
        let gas = tx
            .get("gas")
            .and_then(Value::as_str)
            .map(|g| u64::from_str_radix(g.trim_start_matches("0x"), 16))
            .transpose()
            .map_err(|e| bad(e.to_string()))?
            .unwrap_or(BASE_GAS_USED * 4);

        let mut state = self.state.lock();
        if state.reject_transactions {
            return Err(ProviderRpcError::user_rejected());
        }

        let mut preimage = Vec::with_capacity(48 + data.len());
        preimage.extend_from_slice(from.as_bytes());
        preimage.extend_from_slice(to.as_bytes());
        preimage.extend_from_slice(&data);
        preimage.extend_from_slice(&(state.sent.len() as u64).to_be_bytes());
        let hash = Hash::keccak256_hex(&preimage);

        state.block_number += 1;
        let (status, gas_used) = if state.out_of_gas {
            (false, gas)
        } else if state.revert {
            (false, BASE_GAS_USED.min(gas))
        } else {
            (true, BASE_GAS_USED.min(gas))
        };
        let receipt = PendingReceipt {
            status,
            gas_used,
            block_number: state.block_number,
            polls_left: state.confirmation_polls,
        };
        state.receipts.insert(hash.clone(), receipt);
        state.sent.push(SentTransaction {
            hash: hash.clone(),
            from,
            to,
            data,
            gas,
        });

        Ok(Value::String(hash))
    }

    fn transaction_receipt(&self, params: &[Value]) -> Result<Value, ProviderRpcError> {
        let hash = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderRpcError::new(INVALID_PARAMS, "missing transaction hash"))?;

        let mut state = self.state.lock();
        let Some(pending) = state.receipts.get_mut(hash) else {
            return Ok(Value::Null);
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(Value::Null);
        }

        Ok(json!({
            "transactionHash": hash,
            "status": if pending.status { "0x1" } else { "0x0" },
            "gasUsed": format!("{:#x}", pending.gas_used),
            "blockNumber": format!("{:#x}", pending.block_number),
        }))
    }
}

impl Default for DevWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for DevWallet {
    async fn request(&self, args: RequestArguments) -> Result<Value, ProviderRpcError> {
        let latency = {
            let mut state = self.state.lock();
            *state.requests.entry(args.method.clone()).or_default() += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match args.method.as_str() {
            "eth_requestAccounts" => {
                if self.state.lock().reject_connections {
                    return Err(ProviderRpcError::user_rejected());
                }
                Ok(json!([self.account.to_string()]))
            }
            "eth_accounts" => Ok(json!([self.account.to_string()])),
            "eth_chainId" => Ok(Value::String(format!("{DEV_CHAIN_ID:#x}"))),
            "eth_sendTransaction" => self.send_transaction(&args.params),
            "eth_getTransactionReceipt" => self.transaction_receipt(&args.params),
            other => Err(ProviderRpcError::new(
                ProviderRpcError::UNSUPPORTED_METHOD,
                format!("method {other} is not supported"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_args(wallet: &DevWallet) -> RequestArguments {
        RequestArguments::new("eth_sendTransaction").with_params(vec![json!({
            "from": wallet.account().to_string(),
            "to": "0x00000000000000000000000000000000004c5748",
            "data": "0xdeadbeef",
            "gas": "0x186a0",
        })])
    }

    #[tokio::test]
    async fn test_send_and_mine() {
        let wallet = DevWallet::new();
        let hash = wallet.request(send_args(&wallet)).await.unwrap();
        let hash = hash.as_str().unwrap().to_string();

        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(sent[0].gas, 100_000);

        let receipt = wallet
            .request(RequestArguments::new("eth_getTransactionReceipt").with_params(vec![json!(hash)]))
            .await
            .unwrap();
        assert_eq!(receipt["status"], "0x1");
    }

    #[tokio::test]
    async fn test_pending_receipts() {
        let wallet = DevWallet::new();
        wallet.set_confirmation_polls(2);
        let hash = wallet.request(send_args(&wallet)).await.unwrap();
        let poll = RequestArguments::new("eth_getTransactionReceipt").with_params(vec![hash]);

        assert!(wallet.request(poll.clone()).await.unwrap().is_null());
        assert!(wallet.request(poll.clone()).await.unwrap().is_null());
        assert!(!wallet.request(poll).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_rejects_foreign_sender() {
        let wallet = DevWallet::new();
        let other = DevWallet::new();
        let err = wallet.request(send_args(&other)).await.unwrap_err();
        assert_eq!(err.code, ProviderRpcError::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let wallet = DevWallet::new();
        let err = wallet.request(RequestArguments::new("eth_sign")).await.unwrap_err();
        assert_eq!(err.code, ProviderRpcError::UNSUPPORTED_METHOD);
    }
}
