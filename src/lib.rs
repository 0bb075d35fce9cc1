//! # Courier
//!
//! Encrypted messaging over a ledger topic service, with optional on-chain
//! notarization of message hashes.
//!
//! ## Features
//!
//! - **Sealed messages**: X25519 + ChaCha20-Poly1305 envelopes in printable armor
//! - **Topic publishing** paid for and signed by an operator account
//! - **Cursor polling** of the topic into an append-only received log
//! - **Notarization**: `logMessage(bytes32)` through an EIP-1193 wallet
//! - **Provisioning**: chunked contract deployment and topic creation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier::{ledger::{InMemoryLedger, LedgerLogClient}, wallet::WalletSession, MessageExchangeController};
//!
//! # async fn run() -> courier::Result<()> {
//! let ledger = Arc::new(InMemoryLedger::new());
//! let operator = ledger.create_operator(1_000_000_000);
//! let topic = ledger.create_topic("chat");
//!
//! let log = LedgerLogClient::new(ledger, operator);
//! let controller = MessageExchangeController::new(log, topic, WalletSession::without_provider());
//!
//! controller.generate_keypair("alice")?;
//! let message = controller.draft("hello");
//! controller.encrypt(message.id).await?;
//! controller.submit(message.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              APPLICATION LAYER              │
//! │  courier | courier-deploy | courier-topic   │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │              EXCHANGE LAYER                 │
//! │  MessageExchangeController | ReceivedLog    │
//! └──────────┬──────────┬──────────┬────────────┘
//!            │          │          │
//! ┌──────────▼──┐ ┌─────▼──────┐ ┌─▼────────────┐
//! │   CRYPTO    │ │   LEDGER   │ │ WALLET/NOTARY│
//! │ Keyring     │ │ LogClient  │ │ EIP-1193     │
//! │ Codec       │ │ Gateway    │ │ logMessage   │
//! └─────────────┘ └────────────┘ └──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod notary;
pub mod provision;
pub mod wallet;

// Re-export main types at crate root
pub use config::Config;
pub use crypto::{CryptoError, CryptoResult, Keypair, KeyringManager, MessageCodec};
pub use error::{Error, Result};
pub use exchange::{Message, MessageExchangeController, MessageId, MessageStatus, ReceivedMessage, RetryPolicy};
pub use ledger::{LedgerClient, LedgerLogClient, TopicId};
pub use notary::ContractNotary;
pub use wallet::{Address, WalletSession};
