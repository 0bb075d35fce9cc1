//! In-memory ledger
//!
//! A single-process stand-in for a ledger node, used by tests, the demo
//! command and the development gateway. It checks signatures, payer
//! balances, duplicate ids and service limits the way a node would, and
//! supports fault injection:
//!
//! - queued failures for `execute` and `topic_messages`
//! - artificial latency before each `execute`
//! - a redelivery mode in which topic queries ignore the caller's cursor

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::entity::{AccountId, ContractId, EntityId, FileId, TopicId};
use super::operator::{Operator, OperatorKey, OperatorPublicKey};
use super::transaction::{FrozenTransaction, Receipt, Timestamp, TransactionBody, TransactionId};
use super::{LedgerClient, LedgerError, LedgerResult, TopicMessage};

/// Fee charged per transaction
pub const TRANSACTION_FEE: u64 = 100_000;

/// First entity number handed out
const FIRST_ENTITY_NUM: u64 = 1001;

struct Account {
    public_key: OperatorPublicKey,
    balance: u64,
}

struct Topic {
    memo: String,
    messages: Vec<TopicMessage>,
}

struct File {
    keys: Vec<OperatorPublicKey>,
    contents: Vec<u8>,
    chunks: Vec<usize>,
}

struct Contract {
    bytecode: Vec<u8>,
    gas: u64,
}

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    topics: HashMap<TopicId, Topic>,
    files: HashMap<FileId, File>,
    contracts: HashMap<ContractId, Contract>,
    executed: HashSet<TransactionId>,
    next_num: u64,
}

impl State {
    fn allocate(&mut self) -> EntityId {
        if self.next_num < FIRST_ENTITY_NUM {
            self.next_num = FIRST_ENTITY_NUM;
        }
        let id = EntityId::new(0, 0, self.next_num);
        self.next_num += 1;
        id
    }
}

#[derive(Default)]
struct Faults {
    execute: VecDeque<LedgerError>,
    query: VecDeque<LedgerError>,
    latency: Option<Duration>,
    redeliver: bool,
}

/// In-memory ledger
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a balance
    pub fn register_account(&self, account: AccountId, public_key: OperatorPublicKey, balance: u64) {
        self.state
            .lock()
            .accounts
            .insert(account, Account { public_key, balance });
    }

    /// Create a funded account with a fresh key and return it as an operator
    pub fn create_operator(&self, balance: u64) -> Operator {
        let key = OperatorKey::generate();
        let account = AccountId(self.state.lock().allocate());
        self.register_account(account, *key.public_key(), balance);
        Operator::new(account, key)
    }

    /// Create a topic directly, bypassing transactions
    pub fn create_topic(&self, memo: &str) -> TopicId {
        let mut state = self.state.lock();
        let topic_id = TopicId(state.allocate());
        state.topics.insert(
            topic_id,
            Topic {
                memo: memo.to_string(),
                messages: Vec::new(),
            },
        );
        topic_id
    }

    /// Fail the next `times` executions with `error`
    pub fn inject_execute_failure(&self, error: LedgerError, times: usize) {
        let mut faults = self.faults.lock();
        for _ in 0..times {
            faults.execute.push_back(error.clone());
        }
    }

    /// Fail the next `times` topic queries with `error`
    pub fn inject_query_failure(&self, error: LedgerError, times: usize) {
        let mut faults = self.faults.lock();
        for _ in 0..times {
            faults.query.push_back(error.clone());
        }
    }

    /// Delay every execution by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().latency = latency;
    }

    /// Ignore query cursors and return every message from the start
    pub fn set_redelivery(&self, redeliver: bool) {
        self.faults.lock().redeliver = redeliver;
    }

    /// Balance of an account
    pub fn balance(&self, account: &AccountId) -> Option<u64> {
        self.state.lock().accounts.get(account).map(|a| a.balance)
    }

    /// All messages on a topic
    pub fn messages(&self, topic_id: &TopicId) -> Vec<TopicMessage> {
        self.state
            .lock()
            .topics
            .get(topic_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// Memo a topic was created with
    pub fn topic_memo(&self, topic_id: &TopicId) -> Option<String> {
        self.state.lock().topics.get(topic_id).map(|t| t.memo.clone())
    }

    /// Current contents of a file
    pub fn file_contents(&self, file_id: &FileId) -> Option<Vec<u8>> {
        self.state.lock().files.get(file_id).map(|f| f.contents.clone())
    }

    /// Sizes of the appends made to a file, in order
    pub fn file_appends(&self, file_id: &FileId) -> Vec<usize> {
        self.state
            .lock()
            .files
            .get(file_id)
            .map(|f| f.chunks.clone())
            .unwrap_or_default()
    }

    /// Bytecode and gas of a deployed contract
    pub fn contract(&self, contract_id: &ContractId) -> Option<(Vec<u8>, u64)> {
        self.state
            .lock()
            .contracts
            .get(contract_id)
            .map(|c| (c.bytecode.clone(), c.gas))
    }

    /// Number of successfully executed transactions
    pub fn executed_count(&self) -> usize {
        self.state.lock().executed.len()
    }

    fn apply(&self, transaction: &FrozenTransaction) -> LedgerResult<Receipt> {
        transaction.verify_signature()?;

        let mut state = self.state.lock();
        let id = *transaction.transaction_id();

        let account = state
            .accounts
            .get(&id.payer)
            .ok_or(LedgerError::UnknownPayer(id.payer))?;
        if account.public_key != *transaction.signer() {
            return Err(LedgerError::InvalidSignature);
        }
        if account.balance < TRANSACTION_FEE {
            return Err(LedgerError::InsufficientBalance {
                account: id.payer,
                needed: TRANSACTION_FEE,
                available: account.balance,
            });
        }
        if state.executed.contains(&id) {
            return Err(LedgerError::DuplicateTransaction(id));
        }

        let consensus_timestamp = Timestamp::now();
        let mut receipt = Receipt::new(id, consensus_timestamp);

        match transaction.body() {
            TransactionBody::TopicCreate { memo } => {
                let topic_id = TopicId(state.allocate());
                state.topics.insert(
                    topic_id,
                    Topic {
                        memo: memo.clone(),
                        messages: Vec::new(),
                    },
                );
                receipt.topic_id = Some(topic_id);
            }
            TransactionBody::TopicMessageSubmit { topic_id, message } => {
                let topic = state
                    .topics
                    .get_mut(topic_id)
                    .ok_or(LedgerError::TopicNotFound(*topic_id))?;
                let sequence_number = topic.messages.len() as u64 + 1;
                topic.messages.push(TopicMessage {
                    topic_id: *topic_id,
                    sequence_number,
                    consensus_timestamp,
                    contents: message.clone(),
                });
                receipt.topic_sequence_number = Some(sequence_number);
            }
            TransactionBody::FileCreate { keys, contents } => {
                let file_id = FileId(state.allocate());
                state.files.insert(
                    file_id,
                    File {
                        keys: keys.clone(),
                        contents: contents.clone(),
                        chunks: Vec::new(),
                    },
                );
                receipt.file_id = Some(file_id);
            }
            TransactionBody::FileAppend { file_id, contents } => {
                let file = state
                    .files
                    .get_mut(file_id)
                    .ok_or(LedgerError::FileNotFound(*file_id))?;
                if !file.keys.contains(transaction.signer()) {
                    return Err(LedgerError::Rejected(format!(
                        "file {file_id} is not writable by the signer"
                    )));
                }
                file.contents.extend_from_slice(contents);
                file.chunks.push(contents.len());
            }
            TransactionBody::ContractCreate { bytecode_file_id, gas } => {
                let file = state
                    .files
                    .get(bytecode_file_id)
                    .ok_or(LedgerError::FileNotFound(*bytecode_file_id))?;
                let text = String::from_utf8_lossy(&file.contents);
                let bytecode = hex::decode(text.trim().trim_start_matches("0x"))
                    .map_err(|e| LedgerError::Rejected(format!("bytecode file is not hex: {e}")))?;
                if bytecode.is_empty() {
                    return Err(LedgerError::Rejected("bytecode file is empty".to_string()));
                }
                let contract_id = ContractId(state.allocate());
                state.contracts.insert(contract_id, Contract { bytecode, gas: *gas });
                receipt.contract_id = Some(contract_id);
            }
        }

        if let Some(account) = state.accounts.get_mut(&id.payer) {
            account.balance -= TRANSACTION_FEE;
        }
        state.executed.insert(id);

        debug!(
            transaction = %id,
            kind = transaction.body().name(),
            "Executed transaction"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn execute(&self, transaction: &FrozenTransaction) -> LedgerResult<Receipt> {
        let latency = self.faults.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.faults.lock().execute.pop_front() {
            return Err(error);
        }

        self.apply(transaction)
    }

    async fn topic_messages(
        &self,
        topic_id: &TopicId,
        after: u64,
        limit: usize,
    ) -> LedgerResult<Vec<TopicMessage>> {
        let redeliver = {
            let mut faults = self.faults.lock();
            if let Some(error) = faults.query.pop_front() {
                return Err(error);
            }
            faults.redeliver
        };
        let after = if redeliver { 0 } else { after };

        let state = self.state.lock();
        let topic = state
            .topics
            .get(topic_id)
            .ok_or(LedgerError::TopicNotFound(*topic_id))?;

        Ok(topic
            .messages
            .iter()
            .filter(|m| m.sequence_number > after)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::Transaction;

    #[tokio::test]
    async fn test_submit_and_query() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        let topic = ledger.create_topic("chat");

        for text in ["one", "two", "three"] {
            let tx = Transaction::topic_message_submit(topic, text.as_bytes().to_vec())
                .freeze_with(&op)
                .unwrap();
            ledger.execute(&tx).await.unwrap();
        }

        let all = ledger.topic_messages(&topic, 0, 100).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].contents, b"three");

        let after_one = ledger.topic_messages(&topic, 1, 100).await.unwrap();
        assert_eq!(
            after_one.iter().map(|m| m.sequence_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(ledger.topic_messages(&topic, 0, 1).await.unwrap().len(), 1);
        assert_eq!(ledger.balance(&op.account()), Some(7 * TRANSACTION_FEE));
    }

    #[tokio::test]
    async fn test_rejects_unknown_payer_and_wrong_key() {
        let ledger = InMemoryLedger::new();
        let topic = ledger.create_topic("");

        let stranger = Operator::new(AccountId::new(0, 0, 77), OperatorKey::generate());
        let tx = Transaction::topic_message_submit(topic, b"x".to_vec())
            .freeze_with(&stranger)
            .unwrap();
        assert_eq!(
            ledger.execute(&tx).await,
            Err(LedgerError::UnknownPayer(AccountId::new(0, 0, 77)))
        );

        let real = ledger.create_operator(TRANSACTION_FEE);
        let impostor = Operator::new(real.account(), OperatorKey::generate());
        let tx = Transaction::topic_message_submit(topic, b"x".to_vec())
            .freeze_with(&impostor)
            .unwrap();
        assert_eq!(ledger.execute(&tx).await, Err(LedgerError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(TRANSACTION_FEE - 1);
        let tx = Transaction::topic_create("").freeze_with(&op).unwrap();
        assert!(matches!(
            ledger.execute(&tx).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        let tx = Transaction::topic_create("").freeze_with(&op).unwrap();
        ledger.execute(&tx).await.unwrap();
        assert_eq!(
            ledger.execute(&tx).await,
            Err(LedgerError::DuplicateTransaction(*tx.transaction_id()))
        );
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(TRANSACTION_FEE);
        let missing = TopicId::new(0, 0, 5);
        let tx = Transaction::topic_message_submit(missing, b"x".to_vec())
            .freeze_with(&op)
            .unwrap();
        assert_eq!(ledger.execute(&tx).await, Err(LedgerError::TopicNotFound(missing)));
        assert!(ledger.topic_messages(&missing, 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        ledger.inject_execute_failure(LedgerError::Network("down".into()), 1);

        let tx = Transaction::topic_create("").freeze_with(&op).unwrap();
        assert_eq!(ledger.execute(&tx).await, Err(LedgerError::Network("down".into())));
        assert!(ledger.execute(&tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_redelivery_ignores_cursor() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        let topic = ledger.create_topic("");
        let tx = Transaction::topic_message_submit(topic, b"x".to_vec())
            .freeze_with(&op)
            .unwrap();
        ledger.execute(&tx).await.unwrap();

        assert!(ledger.topic_messages(&topic, 1, 10).await.unwrap().is_empty());
        ledger.set_redelivery(true);
        assert_eq!(ledger.topic_messages(&topic, 1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_and_contract_flow() {
        let ledger = InMemoryLedger::new();
        let op = ledger.create_operator(10 * TRANSACTION_FEE);

        let create = Transaction::file_create(vec![*op.public_key()], Vec::new())
            .freeze_with(&op)
            .unwrap();
        let file_id = ledger.execute(&create).await.unwrap().file_id.unwrap();

        for chunk in ["6080", "6040"] {
            let append = Transaction::file_append(file_id, chunk.as_bytes().to_vec())
                .freeze_with(&op)
                .unwrap();
            ledger.execute(&append).await.unwrap();
        }
        assert_eq!(ledger.file_appends(&file_id), vec![4, 4]);
        assert_eq!(ledger.file_contents(&file_id).unwrap(), b"60806040");

        let deploy = Transaction::contract_create(file_id, 1_000_000)
            .freeze_with(&op)
            .unwrap();
        let contract_id = ledger.execute(&deploy).await.unwrap().contract_id.unwrap();
        let (bytecode, gas) = ledger.contract(&contract_id).unwrap();
        assert_eq!(bytecode, vec![0x60, 0x80, 0x60, 0x40]);
        assert_eq!(gas, 1_000_000);
    }

    #[tokio::test]
    async fn test_file_append_requires_file_key() {
        let ledger = InMemoryLedger::new();
        let owner = ledger.create_operator(10 * TRANSACTION_FEE);
        let other = ledger.create_operator(10 * TRANSACTION_FEE);

        let create = Transaction::file_create(vec![*owner.public_key()], Vec::new())
            .freeze_with(&owner)
            .unwrap();
        let file_id = ledger.execute(&create).await.unwrap().file_id.unwrap();

        let append = Transaction::file_append(file_id, b"00".to_vec())
            .freeze_with(&other)
            .unwrap();
        assert!(matches!(ledger.execute(&append).await, Err(LedgerError::Rejected(_))));
    }
}
