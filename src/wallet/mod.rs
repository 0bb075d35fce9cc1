//! Wallet connection
//!
//! A [`WalletSession`] holds at most one connected address, obtained from an
//! injected [`WalletProvider`]. Connecting is idempotent: once an address is
//! held, further calls return it without prompting. Concurrent connects are
//! serialized so the user sees a single prompt.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub mod address;
pub mod dev;
pub mod provider;

pub use address::Address;
pub use dev::DevWallet;
pub use provider::{ProviderRpcError, RequestArguments, WalletProvider};

/// Default time the user has to answer a wallet prompt
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wallet errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// No provider was injected
    #[error("No wallet provider available")]
    NoProvider,

    /// The user declined the prompt
    #[error("User rejected the request")]
    UserRejected,

    /// An operation needs a connected account
    #[error("Wallet is not connected")]
    NotConnected,

    /// The provider returned no accounts
    #[error("Wallet returned no accounts")]
    NoAccounts,

    /// Malformed address
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// The prompt was not answered in time
    #[error("Wallet did not respond within {0:?}")]
    Timeout(Duration),

    /// Any other provider error
    #[error(transparent)]
    Provider(ProviderRpcError),

    /// The provider answered with something unexpected
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderRpcError> for WalletError {
    fn from(err: ProviderRpcError) -> Self {
        if err.is_user_rejected() {
            WalletError::UserRejected
        } else {
            WalletError::Provider(err)
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

/// The connected external account
pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    prompt_timeout: Duration,
    address: RwLock<Option<Address>>,
    connecting: tokio::sync::Mutex<()>,
}

impl WalletSession {
    /// Session over an optional injected provider
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        WalletSession {
            provider,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            address: RwLock::new(None),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Session over a provider
    pub fn with_provider(provider: Arc<dyn WalletProvider>) -> Self {
        Self::new(Some(provider))
    }

    /// Session with no provider; `connect` fails with `NoProvider`
    pub fn without_provider() -> Self {
        Self::new(None)
    }

    /// Set the prompt timeout
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Whether a provider was injected
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Connected address, if any
    pub fn address(&self) -> Option<Address> {
        *self.address.read()
    }

    /// Whether an address is held
    pub fn is_connected(&self) -> bool {
        self.address.read().is_some()
    }

    /// Ask the provider for accounts and keep the first one
    pub async fn connect(&self) -> WalletResult<Address> {
        if let Some(address) = self.address() {
            return Ok(address);
        }
        let provider = self.provider.as_ref().ok_or(WalletError::NoProvider)?;

        let _guard = self.connecting.lock().await;
        // Another caller may have connected while we waited
        if let Some(address) = self.address() {
            return Ok(address);
        }

        let response = self
            .prompt(provider.as_ref(), RequestArguments::new("eth_requestAccounts"))
            .await
            .map_err(|e| {
                warn!(error = %e, "Wallet connection failed");
                e
            })?;

        let first = response
            .as_array()
            .ok_or_else(|| WalletError::InvalidResponse(format!("expected account list, got {response}")))?
            .first()
            .ok_or(WalletError::NoAccounts)?;
        let address: Address = first
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse(format!("expected address string, got {first}")))?
            .parse()?;

        *self.address.write() = Some(address);
        info!(%address, "Wallet connected");
        Ok(address)
    }

    /// Forget the connected address, returning it
    pub fn disconnect(&self) -> Option<Address> {
        let previous = self.address.write().take();
        if let Some(address) = previous {
            info!(%address, "Wallet disconnected");
        }
        previous
    }

    /// Forward a request to the provider under the prompt timeout
    pub async fn request(&self, args: RequestArguments) -> WalletResult<Value> {
        let provider = self.provider.as_ref().ok_or(WalletError::NoProvider)?;
        self.prompt(provider.as_ref(), args).await
    }

    async fn prompt(&self, provider: &dyn WalletProvider, args: RequestArguments) -> WalletResult<Value> {
        match tokio::time::timeout(self.prompt_timeout, provider.request(args)).await {
            Ok(result) => result.map_err(WalletError::from),
            Err(_) => Err(WalletError::Timeout(self.prompt_timeout)),
        }
    }
}
