//! Core ledger primitives for walletchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Hashing (Blake3 ids and digests)
//! - Ed25519 keys, signatures and the signature verifier
//! - Wallets and unspent outputs
//! - Transactions and the canonical signed message
//! - Blocks and the merkle digest
//! - An injectable clock

pub mod block;
pub mod clock;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod utxo;
pub mod wallet;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockHeader, FIRST_BLOCK_INDEX};
pub use clock::{format_timestamp, Clock, ManualClock, SystemClock};
pub use crypto::{verify, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, Hash, H256};
pub use merkle::{merkle_root, verify_merkle_root};
pub use transaction::{
    canonical_message, transaction_id, FinalizedTransaction, Transaction, TransactionError,
    TransactionId, TransactionRecord, TxOutput, FIELD_SEPARATOR,
};
pub use utxo::{checked_total, output_id, OutputId, UnspentOutput};
pub use wallet::{Wallet, WalletId, WalletIdError, SYSTEM_SENDER};
