//! EIP-1193 provider interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Arguments of a provider `request` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    /// JSON-RPC method
    pub method: String,
    /// Positional parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl RequestArguments {
    /// Request with no parameters
    pub fn new(method: impl Into<String>) -> Self {
        RequestArguments {
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Attach parameters
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Error object returned by a provider
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[error("Provider error {code}: {message}")]
pub struct ProviderRpcError {
    /// EIP-1193 or JSON-RPC error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Extra data, such as revert reasons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    /// The user rejected the request
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method or account is not authorized
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the method
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains
    pub const DISCONNECTED: i64 = 4900;

    /// Error with a code and message
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ProviderRpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The standard rejection error
    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    /// Whether the user declined the prompt
    pub fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

/// An injected wallet, such as a browser extension
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Send a JSON-RPC request to the wallet
    async fn request(&self, args: RequestArguments) -> Result<Value, ProviderRpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let args = RequestArguments::new("eth_requestAccounts");
        assert_eq!(
            serde_json::to_value(&args).unwrap(),
            json!({"method": "eth_requestAccounts"})
        );

        let args = RequestArguments::new("eth_getTransactionReceipt").with_params(vec![json!("0xab")]);
        assert_eq!(serde_json::to_value(&args).unwrap()["params"], json!(["0xab"]));
    }

    #[test]
    fn test_rejection_code() {
        assert!(ProviderRpcError::user_rejected().is_user_rejected());
        assert!(!ProviderRpcError::new(ProviderRpcError::DISCONNECTED, "offline").is_user_rejected());

        let parsed: ProviderRpcError =
            serde_json::from_str(r#"{"code":4001,"message":"denied"}"#).unwrap();
        assert!(parsed.is_user_rejected());
    }
}
