//! Ledger store backends for walletchain.
//!
//! This crate owns every mutable ledger record:
//! - Wallets and their public keys
//! - Unspent (and spent) outputs, indexed by owner
//! - Pending and finalized transactions
//! - Blocks and the chain tip
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Admission / Finalization engines            │
//! └────────────────────────┬────────────────────────────────┘
//!                          │  &dyn LedgerStore
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   LedgerStore trait                      │
//! │  ┌──────────────────────┐   ┌─────────────────────────┐  │
//! │  │ SledLedger           │   │ MemoryLedger            │  │
//! │  │  - prefixed keys     │   │  - typed maps           │  │
//! │  │  - Tree::transaction │   │  - one RwLock per op    │  │
//! │  │  - versioned records │   │                         │  │
//! │  └──────────┬───────────┘   └─────────────────────────┘  │
//! └─────────────┼───────────────────────────────────────────┘
//!               │
//! ┌─────────────▼───────────────────────────────────────────┐
//! │                    sled Database                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use walletchain_core::{Keypair, Wallet};
//! use walletchain_storage::{LedgerStore, SledLedger};
//!
//! let store = SledLedger::open("./ledger_data").unwrap();
//! let keypair = Keypair::generate();
//! let wallet = Wallet::new(keypair.public_key.clone(), None);
//! store.register_wallet(&wallet).unwrap();
//! assert_eq!(store.balance(&wallet.id).unwrap(), 0);
//! ```

pub mod db;
pub mod memory;
pub mod sled_ledger;
pub mod store;

// Re-export commonly used types
pub use db::{Result, Storage, StoreError, RECORD_VERSION};
pub use memory::MemoryLedger;
pub use sled_ledger::SledLedger;
pub use store::{ChainTip, Conflict, LedgerStore};
