//! Proof-of-work consensus for walletchain.
//!
//! - [`ProofOfWork`] searches nonces until a block hash carries the
//!   required number of leading hex zeros.
//! - [`ChainValidator`] walks stored blocks and reports linkage, digest
//!   and work problems.
//!
//! # Example
//!
//! ```rust,no_run
//! use walletchain_consensus::{ChainValidator, ProofOfWork};
//! use walletchain_core::{hash, SystemClock};
//!
//! let pow = ProofOfWork::new(2).unwrap();
//! let block = pow.mine(1, None, vec![hash(b"tx")], &SystemClock).unwrap();
//! assert!(block.hash.to_hex().starts_with("00"));
//!
//! let problems = ChainValidator::new().validate(&[block]);
//! assert!(problems.is_empty());
//! ```

pub mod pow;
pub mod validator;

pub use pow::{ConsensusError, ProofOfWork, Result, MAX_DIFFICULTY};
pub use validator::{ChainProblem, ChainValidator};
