//! Message exchange lifecycle
//!
//! ```text
//!   draft ──► Drafted ──encrypt──► Encrypted ──submit──► Submitted
//!                │                     │                    │
//!                └──────► Failed ◄─────┘                    │
//!                                                           │
//!   notarize (Encrypted | Submitted) ── records hash, status unchanged
//! ```
//!
//! A `Failed` message is retried from the stage that failed: without a
//! ciphertext it can be encrypted again, with one it can be submitted again.
//! Incoming topic messages land in an append-only received log that never
//! depends on the state of outgoing messages.

pub mod message;
pub mod received;
pub mod retry;

pub use message::{Message, MessageId, MessageStatus, Stage};
pub use received::{ReceivedLog, ReceivedMessage};
pub use retry::RetryPolicy;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{CryptoError, Keypair, KeyringManager, MessageCodec};
use crate::error::{Error, Result};
use crate::ledger::{LedgerClient, LedgerLogClient, Receipt, Subscription, TopicId};
use crate::notary::{self, ContractNotary, NotaryReceipt, DEFAULT_RECEIPT_POLL_INTERVAL};
use crate::wallet::{Address, WalletProvider, WalletSession};

/// Independent transition lanes of a message. Notarization never changes the
/// primary status, so it may run alongside a submit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Lane {
    Primary,
    Notary,
}

/// Marks a message as busy on one lane until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<(MessageId, Lane)>>,
    key: (MessageId, Lane),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Orchestrates keys, encryption, publication, notarization and watching
/// for one session.
pub struct MessageExchangeController {
    keyring: RwLock<KeyringManager>,
    codec: MessageCodec,
    log: LedgerLogClient,
    topic_id: TopicId,
    wallet: WalletSession,
    notary: Option<ContractNotary>,
    retry: RetryPolicy,
    messages: Mutex<Vec<Message>>,
    in_flight: Mutex<HashSet<(MessageId, Lane)>>,
    received: Arc<Mutex<ReceivedLog>>,
    watcher: tokio::sync::Mutex<Option<Subscription>>,
}

impl MessageExchangeController {
    /// Controller publishing to `topic_id`, without a notary
    pub fn new(log: LedgerLogClient, topic_id: TopicId, wallet: WalletSession) -> Self {
        MessageExchangeController {
            keyring: RwLock::new(KeyringManager::new()),
            codec: MessageCodec::new(),
            log,
            topic_id,
            wallet,
            notary: None,
            retry: RetryPolicy::default(),
            messages: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            received: Arc::new(Mutex::new(ReceivedLog::new())),
            watcher: tokio::sync::Mutex::new(None),
        }
    }

    /// Enable notarization through `notary`
    pub fn with_notary(mut self, notary: ContractNotary) -> Self {
        self.notary = Some(notary);
        self
    }

    /// Replace the submission retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a controller from configuration
    pub fn from_config(
        config: &Config,
        ledger: Arc<dyn LedgerClient>,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Self> {
        let log = LedgerLogClient::new(ledger, config.operator()?)
            .with_publish_timeout(config.publish_timeout())
            .with_poll_interval(config.poll_interval())
            .with_page_limit(config.page_limit);
        let wallet = WalletSession::new(provider).with_prompt_timeout(config.prompt_timeout());

        let mut controller =
            Self::new(log, config.topic_id()?, wallet).with_retry_policy(config.retry.clone());

        if let Some(contract) = config.contract_address()? {
            controller = controller.with_notary(
                ContractNotary::new(contract)
                    .with_gas(config.notary_gas)
                    .with_receipt_polling(DEFAULT_RECEIPT_POLL_INTERVAL, config.receipt_timeout()),
            );
        }
        Ok(controller)
    }

    // Keys

    /// Generate the session keypair, replacing any previous one
    pub fn generate_keypair(&self, identity_hint: &str) -> Result<Arc<Keypair>> {
        self.keyring
            .write()
            .generate_keypair(identity_hint)
            .map_err(Error::EncryptionFailure)
    }

    /// Use an existing keypair for this session
    pub fn install_keypair(&self, keypair: Keypair) -> Arc<Keypair> {
        self.keyring.write().install(keypair)
    }

    /// The session keypair
    pub fn keypair(&self) -> Option<Arc<Keypair>> {
        self.keyring.read().current()
    }

    // Outgoing lifecycle

    /// Record a new message in `Drafted`
    pub fn draft(&self, text: impl Into<String>) -> Message {
        let mut messages = self.messages.lock();
        let id = MessageId(messages.len() as u64 + 1);
        let message = Message::draft(id, text.into());
        messages.push(message.clone());
        debug!(message = %id, "Drafted message");
        message
    }

    /// Encrypt a drafted message to the session public key
    pub async fn encrypt(&self, id: MessageId) -> Result<Message> {
        let (_guard, message) = self.begin(id, Lane::Primary, "encrypt", Message::can_encrypt)?;
        let keypair = self.keypair().ok_or(Error::MissingKeypair)?;

        match self.codec.encrypt(&message.plaintext, keypair.public_key()).await {
            Ok(ciphertext) => {
                debug!(message = %id, bytes = ciphertext.len(), "Encrypted message");
                self.update(id, |m| {
                    m.ciphertext = Some(ciphertext);
                    m.status = MessageStatus::Encrypted;
                    m.clear_failure();
                    m.clone()
                })
            }
            Err(e) => {
                warn!(message = %id, error = %e, "Encryption failed");
                self.update(id, |m| m.fail(Stage::Encrypt, &e))?;
                Err(Error::EncryptionFailure(e))
            }
        }
    }

    /// Publish an encrypted message to the topic, retrying transient
    /// failures per the retry policy
    pub async fn submit(&self, id: MessageId) -> Result<Receipt> {
        let (_guard, message) = self.begin(id, Lane::Primary, "submit", Message::can_submit)?;
        let Some(ciphertext) = message.ciphertext else {
            return Err(invalid_transition(message.status, id, "submit"));
        };

        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.update(id, |m| m.submit_attempts += 1)?;

            match self.log.publish(&self.topic_id, ciphertext.as_bytes()).await {
                Ok(receipt) => {
                    info!(message = %id, attempt, sequence = ?receipt.topic_sequence_number, "Message submitted");
                    let stored = receipt.clone();
                    self.update(id, move |m| {
                        m.receipt = Some(stored);
                        m.status = MessageStatus::Submitted;
                        m.clear_failure();
                    })?;
                    return Ok(receipt);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let wait = self.retry.backoff(attempt);
                    warn!(message = %id, attempt, error = %e, ?wait, "Submission failed; retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(message = %id, attempt, error = %e, "Submission failed");
                    self.update(id, |m| m.fail(Stage::Submit, &e))?;
                    return Err(e.into());
                }
            }
        }
    }

    /// Log the message's content hash on the notary contract. The primary
    /// status is left as it was, whatever the outcome.
    pub async fn notarize(&self, id: MessageId) -> Result<NotaryReceipt> {
        let notary = self.notary.as_ref().ok_or(Error::NotaryUnavailable)?;
        let (_guard, message) = self.begin(id, Lane::Notary, "notarize", Message::can_notarize)?;
        if !self.wallet.is_connected() {
            return Err(Error::WalletNotConnected);
        }
        let Some(ciphertext) = message.ciphertext else {
            return Err(invalid_transition(message.status, id, "notarize"));
        };

        let hash = notary::content_hash(&ciphertext);
        match notary.log_hash(&self.wallet, &hash).await {
            Ok(receipt) => {
                info!(message = %id, tx = %receipt.transaction_hash, "Message notarized");
                let stored = receipt.clone();
                self.update(id, move |m| {
                    m.content_hash = Some(hash);
                    m.notarization = Some(stored);
                    m.notarization_error = None;
                })?;
                Ok(receipt)
            }
            Err(e) => {
                warn!(message = %id, error = %e, "Notarization failed");
                self.update(id, |m| m.notarization_error = Some(e.to_string()))?;
                Err(e.into())
            }
        }
    }

    // Incoming

    /// Append raw contents to the received log; returns their position
    pub fn on_received(&self, raw_contents: impl Into<Vec<u8>>) -> usize {
        self.received.lock().push_raw(raw_contents.into())
    }

    /// Decrypt an armored ciphertext with the session private key
    pub async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let keypair = self.keypair().ok_or(Error::MissingKeypair)?;
        self.codec
            .decrypt(ciphertext, keypair.private_key())
            .await
            .map_err(Error::DecryptionFailure)
    }

    /// Decrypt the received message at `index`
    pub async fn decrypt_received(&self, index: usize) -> Result<String> {
        let raw = self
            .received
            .lock()
            .get(index)
            .map(|m| m.raw_contents.clone())
            .ok_or(Error::UnknownReceived(index))?;
        let text = String::from_utf8(raw).map_err(|_| {
            Error::DecryptionFailure(CryptoError::MalformedCiphertext("contents are not UTF-8".into()))
        })?;
        self.decrypt(&text).await
    }

    // Watching

    /// Start polling the topic into the received log. Resumes after the
    /// highest sequence number already received. Returns `false` if a
    /// watcher is already running.
    pub async fn start_watching(&self) -> bool {
        let mut watcher = self.watcher.lock().await;
        if watcher.as_ref().is_some_and(Subscription::is_active) {
            return false;
        }

        let cursor = self.received.lock().last_sequence().unwrap_or(0);
        let received = self.received.clone();
        let subscription = self.log.subscribe_from(self.topic_id, cursor, move |message| {
            let sequence = message.sequence_number;
            match received.lock().push_topic_message(&message) {
                Some(position) => debug!(sequence, position, "Received topic message"),
                None => debug!(sequence, "Skipped redelivered topic message"),
            }
        });

        *watcher = Some(subscription);
        true
    }

    /// Stop polling and wait for the poll task to exit
    pub async fn stop_watching(&self) {
        let subscription = self.watcher.lock().await.take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe().await;
        }
    }

    /// Whether the topic is being polled
    pub async fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Connect the wallet, then start watching the topic
    pub async fn connect_wallet(&self) -> Result<Address> {
        let address = self.wallet.connect().await?;
        self.start_watching().await;
        Ok(address)
    }

    /// Clear the wallet identity and stop watching
    pub async fn disconnect_wallet(&self) -> Option<Address> {
        let address = self.wallet.disconnect();
        self.stop_watching().await;
        address
    }

    // Snapshots

    /// Copy of one message
    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.messages.lock().get(index_of(id)?).cloned()
    }

    /// Copies of all messages, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Copies of all received messages, oldest first
    pub fn received(&self) -> Vec<ReceivedMessage> {
        self.received.lock().entries().to_vec()
    }

    /// Wallet session
    pub fn wallet(&self) -> &WalletSession {
        &self.wallet
    }

    /// Topic client
    pub fn log(&self) -> &LedgerLogClient {
        &self.log
    }

    /// Topic messages are published to
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    /// Check the message exists, claim the lane and check the precondition
    fn begin(
        &self,
        id: MessageId,
        lane: Lane,
        operation: &'static str,
        allowed: fn(&Message) -> bool,
    ) -> Result<(InFlight<'_>, Message)> {
        let messages = self.messages.lock();
        let message = index_of(id)
            .and_then(|i| messages.get(i))
            .ok_or(Error::UnknownMessage(id))?;

        if !self.in_flight.lock().insert((id, lane)) {
            return Err(Error::Busy(id));
        }
        let guard = InFlight {
            set: &self.in_flight,
            key: (id, lane),
        };

        if !allowed(message) {
            return Err(invalid_transition(message.status, id, operation));
        }
        Ok((guard, message.clone()))
    }

    fn update<R>(&self, id: MessageId, f: impl FnOnce(&mut Message) -> R) -> Result<R> {
        let mut messages = self.messages.lock();
        let message = index_of(id)
            .and_then(|i| messages.get_mut(i))
            .ok_or(Error::UnknownMessage(id))?;
        Ok(f(message))
    }
}

fn index_of(id: MessageId) -> Option<usize> {
    usize::try_from(id.0).ok()?.checked_sub(1)
}

fn invalid_transition(status: MessageStatus, id: MessageId, operation: &'static str) -> Error {
    Error::InvalidTransition { id, status, operation }
}
