//! Publish and subscribe on a topic
//!
//! Subscriptions poll with a cursor: each poll asks only for messages after
//! the highest sequence number already delivered, so the callback sees each
//! message once per subscription. Consumers should still dedupe, since a
//! service may redeliver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::entity::TopicId;
use super::operator::Operator;
use super::transaction::{Receipt, Transaction};
use super::{LedgerClient, LedgerError, LedgerResult, TopicMessage};

/// Default deadline for a publish to reach consensus
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest poll interval accepted; `tokio::time::interval` panics on zero
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default number of messages fetched per poll
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Topic client paying with the operator account
#[derive(Clone)]
pub struct LedgerLogClient {
    ledger: Arc<dyn LedgerClient>,
    operator: Arc<Operator>,
    publish_timeout: Duration,
    poll_interval: Duration,
    page_limit: usize,
}

impl LedgerLogClient {
    /// Create a client with default timings
    pub fn new(ledger: Arc<dyn LedgerClient>, operator: Operator) -> Self {
        LedgerLogClient {
            ledger,
            operator: Arc::new(operator),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Set the publish deadline
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Set the poll interval, at least 1 ms
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the page size, at least 1
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Paying operator
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Publish deadline
    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    /// Freeze, sign and execute any transaction within the publish deadline
    pub async fn execute(&self, transaction: Transaction) -> LedgerResult<Receipt> {
        let frozen = transaction.freeze_with(&self.operator)?;
        let id = *frozen.transaction_id();

        debug!(transaction = %id, kind = frozen.body().name(), "Executing transaction");

        match tokio::time::timeout(self.publish_timeout, self.ledger.execute(&frozen)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(transaction = %id, timeout = ?self.publish_timeout, "No receipt before deadline");
                Err(LedgerError::Timeout(self.publish_timeout))
            }
        }
    }

    /// Submit `payload` to `topic_id` and wait for the receipt
    pub async fn publish(&self, topic_id: &TopicId, payload: &[u8]) -> LedgerResult<Receipt> {
        let receipt = self
            .execute(Transaction::topic_message_submit(*topic_id, payload.to_vec()))
            .await?;

        info!(
            topic = %topic_id,
            sequence = ?receipt.topic_sequence_number,
            bytes = payload.len(),
            "Published message"
        );
        Ok(receipt)
    }

    /// One poll step: messages after `cursor`, oldest first
    pub async fn poll_once(&self, topic_id: &TopicId, cursor: u64) -> LedgerResult<Vec<TopicMessage>> {
        self.ledger
            .topic_messages(topic_id, cursor, self.page_limit)
            .await
    }

    /// Poll `topic_id` from the beginning, calling `on_message` for each new message
    pub fn subscribe<F>(&self, topic_id: TopicId, on_message: F) -> Subscription
    where
        F: FnMut(TopicMessage) + Send + 'static,
    {
        self.subscribe_from(topic_id, 0, on_message)
    }

    /// Poll `topic_id` for messages after sequence number `cursor`
    pub fn subscribe_from<F>(&self, topic_id: TopicId, cursor: u64, mut on_message: F) -> Subscription
    where
        F: FnMut(TopicMessage) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let position = Arc::new(AtomicU64::new(cursor));

        let client = self.clone();
        let task_position = position.clone();

        let handle = tokio::spawn(async move {
            info!(topic = %topic_id, cursor, "Subscribed to topic");
            let mut interval = tokio::time::interval(client.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {}
                }

                // Drain every full page before waiting for the next tick
                loop {
                    let after = task_position.load(Ordering::Acquire);
                    let page = match client.poll_once(&topic_id, after).await {
                        Ok(page) => page,
                        Err(e) => {
                            warn!(topic = %topic_id, error = %e, "Poll failed; will retry");
                            break;
                        }
                    };

                    let full = page.len() >= client.page_limit;
                    let mut advanced = false;
                    for message in page {
                        // Services may redeliver; only advance on newer items
                        if message.sequence_number > task_position.load(Ordering::Acquire) {
                            task_position.store(message.sequence_number, Ordering::Release);
                            advanced = true;
                        }
                        on_message(message);
                    }

                    if !full || !advanced || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            debug!(topic = %topic_id, "Subscription stopped");
        });

        Subscription {
            topic_id,
            shutdown: shutdown_tx,
            handle: Some(handle),
            position,
        }
    }
}

/// Handle to a running topic poll
///
/// Dropping the handle aborts the poll task; [`Subscription::unsubscribe`]
/// stops it and waits for it to finish.
pub struct Subscription {
    topic_id: TopicId,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    position: Arc<AtomicU64>,
}

impl Subscription {
    /// Topic being polled
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    /// Highest sequence number seen so far
    pub fn cursor(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Whether the poll task is still running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling and wait for the task to exit
    pub async fn unsubscribe(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(topic = %self.topic_id, cursor = self.cursor(), "Unsubscribed from topic");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
