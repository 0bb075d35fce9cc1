//! One-off ledger provisioning: contract deployment and topic creation
//!
//! Deployment follows the file-service route: create an empty file owned by
//! the operator key, append the bytecode hex text in chunks the file service
//! accepts, then instantiate the contract from that file.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::ledger::{ContractId, FileId, LedgerError, LedgerLogClient, Transaction, TopicId};
use crate::wallet::Address;

/// Largest file append the file service accepts
pub const BYTECODE_CHUNK_SIZE: usize = 4096;

/// Gas ceiling for the contract constructor
pub const CONTRACT_GAS: u64 = 1_000_000;

/// Provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Artifact file could not be read
    #[error("Cannot read artifact {path}: {source}")]
    Io {
        /// Artifact path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Artifact is not JSON or has no bytecode
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// A ledger transaction failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A receipt lacked the entity it should have created
    #[error("Receipt for {0} carried no entity id")]
    MissingEntity(&'static str),
}

/// Result type for provisioning
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Compiled contract artifact; only the bytecode is used
#[derive(Debug, Deserialize)]
pub struct Artifact {
    /// Bytecode as hex text, with or without `0x`
    pub bytecode: String,
}

impl Artifact {
    /// Parse artifact JSON
    pub fn from_json(text: &str) -> ProvisionResult<Self> {
        let artifact: Artifact =
            serde_json::from_str(text).map_err(|e| ProvisionError::InvalidArtifact(e.to_string()))?;
        if artifact.bytecode_hex().is_empty() {
            return Err(ProvisionError::InvalidArtifact("bytecode is empty".into()));
        }
        if !artifact.bytecode_hex().bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProvisionError::InvalidArtifact("bytecode is not hex".into()));
        }
        Ok(artifact)
    }

    /// Read and parse an artifact file
    pub fn from_file(path: &Path) -> ProvisionResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ProvisionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Bytecode hex without the `0x` prefix
    pub fn bytecode_hex(&self) -> &str {
        let trimmed = self.bytecode.trim();
        trimmed.strip_prefix("0x").unwrap_or(trimmed)
    }
}

/// Split `data` into consecutive chunks of at most [`BYTECODE_CHUNK_SIZE`]
pub fn bytecode_chunks(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.chunks(BYTECODE_CHUNK_SIZE)
}

/// Outcome of a deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployReceipt {
    /// File holding the bytecode
    pub file_id: FileId,
    /// Instantiated contract
    pub contract_id: ContractId,
    /// Contract address for wallet calls
    pub address: Address,
    /// Number of appends made
    pub chunks: usize,
}

/// Uploads bytecode and instantiates a contract
pub struct Deployer {
    client: LedgerLogClient,
    gas: u64,
}

impl Deployer {
    /// Deployer paying with `client`'s operator
    pub fn new(client: LedgerLogClient) -> Self {
        Deployer {
            client,
            gas: CONTRACT_GAS,
        }
    }

    /// Override the constructor gas ceiling
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    /// Deploy the artifact's bytecode
    pub async fn deploy(&self, artifact: &Artifact) -> ProvisionResult<DeployReceipt> {
        let operator_key = *self.client.operator().public_key();

        let receipt = self
            .client
            .execute(Transaction::file_create(vec![operator_key], Vec::new()))
            .await?;
        let file_id = receipt.file_id.ok_or(ProvisionError::MissingEntity("FileCreate"))?;
        info!(file = %file_id, "Bytecode file created");

        let mut chunks = 0;
        for chunk in bytecode_chunks(artifact.bytecode_hex().as_bytes()) {
            self.client
                .execute(Transaction::file_append(file_id, chunk))
                .await?;
            chunks += 1;
            debug!(file = %file_id, chunk = chunks, bytes = chunk.len(), "Appended bytecode chunk");
        }
        info!(file = %file_id, chunks, "Bytecode uploaded");

        let receipt = self
            .client
            .execute(Transaction::contract_create(file_id, self.gas))
            .await?;
        let contract_id = receipt
            .contract_id
            .ok_or(ProvisionError::MissingEntity("ContractCreate"))?;
        let address = Address::from_entity(contract_id.entity());
        info!(contract = %contract_id, %address, "Contract deployed");

        Ok(DeployReceipt {
            file_id,
            contract_id,
            address,
            chunks,
        })
    }
}

/// Creates the message topic
pub struct TopicProvisioner {
    client: LedgerLogClient,
}

impl TopicProvisioner {
    /// Provisioner paying with `client`'s operator
    pub fn new(client: LedgerLogClient) -> Self {
        TopicProvisioner { client }
    }

    /// Create a topic and return its id
    pub async fn create(&self, memo: &str) -> ProvisionResult<TopicId> {
        let receipt = self.client.execute(Transaction::topic_create(memo)).await?;
        let topic_id = receipt.topic_id.ok_or(ProvisionError::MissingEntity("TopicCreate"))?;
        info!(topic = %topic_id, "Topic created");
        Ok(topic_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use std::io::Write;
    use std::sync::Arc;

    fn client(ledger: &Arc<InMemoryLedger>) -> LedgerLogClient {
        let operator = ledger.create_operator(1_000_000_000);
        LedgerLogClient::new(ledger.clone(), operator)
    }

    fn artifact_of(hex_len: usize) -> Artifact {
        let bytecode: String = "60".repeat(hex_len / 2);
        Artifact::from_json(&format!(r#"{{"bytecode": "0x{bytecode}"}}"#)).unwrap()
    }

    #[test]
    fn test_chunking() {
        let data = vec![0u8; 10_000];
        let sizes: Vec<usize> = bytecode_chunks(&data).map(<[u8]>::len).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(bytecode_chunks(&[]).count(), 0);
    }

    #[tokio::test]
    async fn test_deploy_uploads_chunks_in_order() {
        let ledger = Arc::new(InMemoryLedger::new());
        let artifact = artifact_of(10_000);

        let receipt = Deployer::new(client(&ledger)).deploy(&artifact).await.unwrap();
        assert_eq!(receipt.chunks, 3);
        assert_eq!(ledger.file_appends(&receipt.file_id), vec![4096, 4096, 1808]);
        assert_eq!(
            ledger.file_contents(&receipt.file_id).unwrap(),
            artifact.bytecode_hex().as_bytes()
        );

        let (bytecode, gas) = ledger.contract(&receipt.contract_id).unwrap();
        assert_eq!(bytecode.len(), 5_000);
        assert_eq!(gas, CONTRACT_GAS);
        assert_eq!(receipt.address, Address::from_entity(receipt.contract_id.entity()));
    }

    #[tokio::test]
    async fn test_rejected_deploy_surfaces_ledger_error() {
        let ledger = Arc::new(InMemoryLedger::new());
        let deployer = Deployer::new(client(&ledger));
        ledger.inject_execute_failure(LedgerError::Rejected("throttled".into()), 1);

        let err = deployer.deploy(&artifact_of(100)).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Ledger(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_create_topic() {
        let ledger = Arc::new(InMemoryLedger::new());
        let topic = TopicProvisioner::new(client(&ledger))
            .create("courier messages")
            .await
            .unwrap();
        assert_eq!(ledger.topic_memo(&topic).as_deref(), Some("courier messages"));
    }

    #[test]
    fn test_artifact_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"contractName": "MessageLogger", "bytecode": "0x6080"}}"#).unwrap();
        let artifact = Artifact::from_file(file.path()).unwrap();
        assert_eq!(artifact.bytecode_hex(), "6080");

        assert!(matches!(
            Artifact::from_json(r#"{"bytecode": "0x"}"#),
            Err(ProvisionError::InvalidArtifact(_))
        ));
        assert!(matches!(
            Artifact::from_json(r#"{"abi": []}"#),
            Err(ProvisionError::InvalidArtifact(_))
        ));
        assert!(matches!(
            Artifact::from_file(Path::new("/nonexistent/artifact.json")),
            Err(ProvisionError::Io { .. })
        ));
    }
}
