//! Runtime configuration
//!
//! Settings come from an optional JSON file, then `COURIER_*` environment
//! variables override individual fields. Secrets (the operator key) are
//! only ever read, never written back or logged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exchange::RetryPolicy;
use crate::ledger::{Operator, TopicId};
use crate::wallet::Address;

/// Operator account id, `shard.realm.num`
pub const ENV_OPERATOR_ID: &str = "COURIER_OPERATOR_ID";
/// Operator private key, raw or DER hex
pub const ENV_OPERATOR_KEY: &str = "COURIER_OPERATOR_KEY";
/// Topic id
pub const ENV_TOPIC_ID: &str = "COURIER_TOPIC_ID";
/// Notary contract address
pub const ENV_CONTRACT_ADDRESS: &str = "COURIER_CONTRACT_ADDRESS";
/// Gateway WebSocket URL
pub const ENV_GATEWAY_URL: &str = "COURIER_GATEWAY_URL";
/// Publish deadline in seconds
pub const ENV_PUBLISH_TIMEOUT: &str = "COURIER_PUBLISH_TIMEOUT_SECS";
/// Wallet prompt deadline in seconds
pub const ENV_PROMPT_TIMEOUT: &str = "COURIER_PROMPT_TIMEOUT_SECS";
/// Poll interval in seconds
pub const ENV_POLL_INTERVAL: &str = "COURIER_POLL_INTERVAL_SECS";
/// Messages per poll
pub const ENV_PAGE_LIMIT: &str = "COURIER_PAGE_LIMIT";
/// Submission attempts
pub const ENV_RETRY_ATTEMPTS: &str = "COURIER_RETRY_MAX_ATTEMPTS";
/// First retry wait in milliseconds
pub const ENV_RETRY_BACKOFF: &str = "COURIER_RETRY_INITIAL_BACKOFF_MS";
/// Gas limit for notary calls
pub const ENV_NOTARY_GAS: &str = "COURIER_NOTARY_GAS";
/// Notary receipt deadline in seconds
pub const ENV_RECEIPT_TIMEOUT: &str = "COURIER_RECEIPT_TIMEOUT_SECS";

/// Default gateway address
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:8790";

/// Courier configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Operator account id
    pub operator_id: Option<String>,
    /// Operator private key
    pub operator_key: Option<String>,
    /// Topic messages are published to
    pub topic_id: Option<String>,
    /// Notary contract; notarization is disabled without it
    pub contract_address: Option<String>,
    /// Ledger gateway
    pub gateway_url: String,
    /// Publish deadline
    pub publish_timeout_secs: u64,
    /// Wallet prompt deadline
    pub prompt_timeout_secs: u64,
    /// Time between topic polls
    pub poll_interval_secs: u64,
    /// Messages fetched per poll
    pub page_limit: usize,
    /// Submission retry policy
    pub retry: RetryPolicy,
    /// Gas limit for notary calls
    pub notary_gas: u64,
    /// Deadline for a notary call to be mined
    pub receipt_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            operator_id: None,
            operator_key: None,
            topic_id: None,
            contract_address: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            publish_timeout_secs: 30,
            prompt_timeout_secs: 30,
            poll_interval_secs: 5,
            page_limit: 100,
            retry: RetryPolicy::default(),
            notary_gas: crate::notary::DEFAULT_NOTARY_GAS,
            receipt_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("operator_id", &self.operator_id)
            .field("operator_key", &self.operator_key.as_ref().map(|_| "<redacted>"))
            .field("topic_id", &self.topic_id)
            .field("contract_address", &self.contract_address)
            .field("gateway_url", &self.gateway_url)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .field("prompt_timeout_secs", &self.prompt_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("page_limit", &self.page_limit)
            .field("retry", &self.retry)
            .field("notary_gas", &self.notary_gas)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Default location of the config file (`<config dir>/courier/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("courier").join("config.json"))
    }

    /// Read a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// File (if given) overridden by the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, keyed by the `COURIER_*` names
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_OPERATOR_ID) {
            self.operator_id = Some(v);
        }
        if let Some(v) = get(ENV_OPERATOR_KEY) {
            self.operator_key = Some(v);
        }
        if let Some(v) = get(ENV_TOPIC_ID) {
            self.topic_id = Some(v);
        }
        if let Some(v) = get(ENV_CONTRACT_ADDRESS) {
            self.contract_address = Some(v);
        }
        if let Some(v) = get(ENV_GATEWAY_URL) {
            self.gateway_url = v;
        }
        override_number(&get, ENV_PUBLISH_TIMEOUT, &mut self.publish_timeout_secs)?;
        override_number(&get, ENV_PROMPT_TIMEOUT, &mut self.prompt_timeout_secs)?;
        override_number(&get, ENV_POLL_INTERVAL, &mut self.poll_interval_secs)?;
        override_number(&get, ENV_PAGE_LIMIT, &mut self.page_limit)?;
        override_number(&get, ENV_RETRY_ATTEMPTS, &mut self.retry.max_attempts)?;
        override_number(&get, ENV_RETRY_BACKOFF, &mut self.retry.initial_backoff_ms)?;
        override_number(&get, ENV_NOTARY_GAS, &mut self.notary_gas)?;
        override_number(&get, ENV_RECEIPT_TIMEOUT, &mut self.receipt_timeout_secs)?;

        Ok(self)
    }

    /// Operator credential
    pub fn operator(&self) -> Result<Operator> {
        let id = self
            .operator_id
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{ENV_OPERATOR_ID} is not set")))?;
        let key = self
            .operator_key
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{ENV_OPERATOR_KEY} is not set")))?;
        Operator::from_strings(id, key).map_err(|e| Error::Config(format!("operator: {e}")))
    }

    /// Topic id
    pub fn topic_id(&self) -> Result<TopicId> {
        self.topic_id
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{ENV_TOPIC_ID} is not set")))?
            .parse()
            .map_err(|e| Error::Config(format!("topic: {e}")))
    }

    /// Notary contract address, if configured
    pub fn contract_address(&self) -> Result<Option<Address>> {
        self.contract_address
            .as_deref()
            .map(|s| s.parse().map_err(|e| Error::Config(format!("contract address: {e}"))))
            .transpose()
    }

    /// Publish deadline
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Wallet prompt deadline
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    /// Time between polls, at least one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Notary receipt deadline
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

fn override_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) -> Result<()> {
    if let Some(v) = get(key) {
        *field = v
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a number, got {v:?}")))?;
    }
    Ok(())
}
