//! Cryptographic building blocks for message exchange
//!
//! - `exchange`: X25519 key agreement
//! - `cipher`: ChaCha20-Poly1305 AEAD
//! - `hash`: BLAKE3 key derivation, Keccak-256 for contract hashes
//! - `armor`: printable-text encoding of keys and ciphertexts
//! - `keyring`: the session keypair
//! - `codec`: sealing messages to a recipient public key

pub mod armor;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod exchange;
pub mod hash;
pub mod keyring;

pub use codec::MessageCodec;
pub use error::{CryptoError, CryptoResult};
pub use exchange::{ExchangeKeypair, ExchangePublicKey, SharedSecret};
pub use hash::Hash;
pub use keyring::{Keypair, KeyringManager};
