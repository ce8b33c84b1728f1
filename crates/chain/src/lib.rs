//! Transfer admission and block finalization for walletchain.
//!
//! This crate brings the ledger together:
//! - **Admission**: signature, input and funds checks, then one atomic
//!   commit per transfer
//! - **Finalization**: pending-pool snapshot, proof-of-work, atomic
//!   pending-to-finalized migration
//! - **Ledger**: facade over both plus the read side
//! - **Config**: difficulty and backend selection
//!
//! # Example
//!
//! ```rust,no_run
//! use walletchain_chain::{Ledger, TransferRequest};
//! use walletchain_core::{format_timestamp, Keypair, SystemClock};
//! use walletchain_storage::SledLedger;
//!
//! let store = SledLedger::open("./ledger_data").unwrap();
//! let clock = SystemClock;
//! let ledger = Ledger::new(&store, &clock, 2).unwrap();
//!
//! let alice = Keypair::generate();
//! ledger.register_wallet(&alice.public_key.to_hex(), Some("alice")).unwrap();
//! ledger.fund("alice", 100, None).unwrap();
//!
//! let input = ledger.wallet("alice").unwrap().utxos[0].id;
//! let now = format_timestamp(&chrono::Utc::now());
//! let request =
//!     TransferRequest::signed("alice", "bob", 60, "rent", &now, vec![input], &alice).unwrap();
//! ledger.admit(&request).unwrap();
//!
//! ledger.finalize().unwrap();
//! ledger.validate_chain().unwrap();
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod finalization;
pub mod ledger;

// Re-export commonly used types
pub use admission::{AdmissionEngine, TransferRequest, DEFAULT_FUNDING_NOTE};
pub use config::{BackendConfig, ConfigError, LedgerConfig, DEFAULT_DIFFICULTY};
pub use error::{LedgerError, Result, ValidationError};
pub use finalization::{FinalizationEngine, FinalizationOutcome};
pub use ledger::{ChainReport, Ledger, LedgerStats, WalletView};
