//! Incoming messages
//!
//! The received log is append-only. Entries that carry a topic sequence
//! number are deduplicated on it, so a service that redelivers does not
//! grow the log. Entries without one are always appended.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ledger::{base64_bytes, Timestamp, TopicMessage};

/// A message observed on the topic
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    /// Bytes as delivered
    #[serde(with = "base64_bytes")]
    pub raw_contents: Vec<u8>,
    /// Position in the received log
    pub observed_at: usize,
    /// Topic sequence number, when known
    pub sequence_number: Option<u64>,
    /// Consensus time, when known
    pub consensus_timestamp: Option<Timestamp>,
}

impl ReceivedMessage {
    /// Contents as text, if they are UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw_contents).ok()
    }
}

/// Append-only sequence of received messages
#[derive(Default, Debug)]
pub struct ReceivedLog {
    entries: Vec<ReceivedMessage>,
    sequences: HashSet<u64>,
    last_sequence: Option<u64>,
}

impl ReceivedLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw contents; returns the new entry's position, or `None` if
    /// an entry with the same sequence number is already present
    pub fn append(
        &mut self,
        raw_contents: Vec<u8>,
        sequence_number: Option<u64>,
        consensus_timestamp: Option<Timestamp>,
    ) -> Option<usize> {
        if let Some(seq) = sequence_number {
            if !self.sequences.insert(seq) {
                return None;
            }
            self.last_sequence = Some(self.last_sequence.map_or(seq, |last| last.max(seq)));
        }
        Some(self.push(raw_contents, sequence_number, consensus_timestamp))
    }

    /// Append contents with no sequence number; never deduplicated
    pub fn push_raw(&mut self, raw_contents: Vec<u8>) -> usize {
        self.push(raw_contents, None, None)
    }

    /// Append a topic message, deduplicated on its sequence number
    pub fn push_topic_message(&mut self, message: &TopicMessage) -> Option<usize> {
        self.append(
            message.contents.clone(),
            Some(message.sequence_number),
            Some(message.consensus_timestamp),
        )
    }

    fn push(
        &mut self,
        raw_contents: Vec<u8>,
        sequence_number: Option<u64>,
        consensus_timestamp: Option<Timestamp>,
    ) -> usize {
        let observed_at = self.entries.len();
        self.entries.push(ReceivedMessage {
            raw_contents,
            observed_at,
            sequence_number,
            consensus_timestamp,
        });
        observed_at
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&ReceivedMessage> {
        self.entries.get(index)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[ReceivedMessage] {
        &self.entries
    }

    /// Highest topic sequence number seen
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}
