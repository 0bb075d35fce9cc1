//! Outgoing messages and their lifecycle status

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::hash::HashOutput;
use crate::ledger::Receipt;
use crate::notary::NotaryReceipt;

/// Session-local message id, assigned at draft time starting from 1
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primary lifecycle status
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Plaintext only
    Drafted,
    /// Holds a ciphertext
    Encrypted,
    /// Ciphertext is on the topic
    Submitted,
    /// A collaborator failed; see `failed_stage`
    Failed,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStatus::Drafted => "Drafted",
            MessageStatus::Encrypted => "Encrypted",
            MessageStatus::Submitted => "Submitted",
            MessageStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Which transition failed
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Stage {
    /// Encryption
    Encrypt,
    /// Topic submission
    Submit,
}

/// An outgoing message
///
/// Snapshots handed out by the controller are copies; the controller's own
/// record is the only one that changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Session-local id
    pub id: MessageId,
    /// Text as drafted
    pub plaintext: String,
    /// Armored ciphertext, once encrypted
    pub ciphertext: Option<String>,
    /// Primary status
    pub status: MessageStatus,
    /// Hash logged on chain, once notarized
    #[serde(with = "hex_hash_opt", default)]
    pub content_hash: Option<HashOutput>,
    /// Topic receipt, once submitted
    pub receipt: Option<Receipt>,
    /// Notary receipt, once notarized
    pub notarization: Option<NotaryReceipt>,
    /// Stage of the most recent primary failure
    pub failed_stage: Option<Stage>,
    /// Most recent primary failure
    pub last_error: Option<String>,
    /// Most recent notarization failure; does not affect `status`
    pub notarization_error: Option<String>,
    /// Publish attempts made, across all submits
    pub submit_attempts: u32,
}

impl Message {
    pub(crate) fn draft(id: MessageId, plaintext: String) -> Self {
        Message {
            id,
            plaintext,
            ciphertext: None,
            status: MessageStatus::Drafted,
            content_hash: None,
            receipt: None,
            notarization: None,
            failed_stage: None,
            last_error: None,
            notarization_error: None,
            submit_attempts: 0,
        }
    }

    /// `Drafted`, or `Failed` before a ciphertext was produced
    pub fn can_encrypt(&self) -> bool {
        match self.status {
            MessageStatus::Drafted => true,
            MessageStatus::Failed => self.ciphertext.is_none(),
            _ => false,
        }
    }

    /// `Encrypted`, or `Failed` while holding a ciphertext
    pub fn can_submit(&self) -> bool {
        match self.status {
            MessageStatus::Encrypted => true,
            MessageStatus::Failed => self.ciphertext.is_some(),
            _ => false,
        }
    }

    /// `Encrypted` or `Submitted`
    pub fn can_notarize(&self) -> bool {
        matches!(self.status, MessageStatus::Encrypted | MessageStatus::Submitted)
            && self.ciphertext.is_some()
    }

    pub(crate) fn fail(&mut self, stage: Stage, error: impl fmt::Display) {
        self.status = MessageStatus::Failed;
        self.failed_stage = Some(stage);
        self.last_error = Some(error.to_string());
    }

    pub(crate) fn clear_failure(&mut self) {
        self.failed_stage = None;
        self.last_error = None;
    }
}

mod hex_hash_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::crypto::hash::HashOutput;

    pub fn serialize<S>(hash: &Option<HashOutput>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match hash {
            Some(h) => serializer.serialize_some(&format!("0x{}", hex::encode(h))),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<HashOutput>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let hash: HashOutput = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32-byte hash"))?;
        Ok(Some(hash))
    }
}
