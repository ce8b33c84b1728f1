//! Proof-of-work block sealing.
//!
//! A block satisfies difficulty `d` when its hex-encoded hash starts
//! with `d` `'0'` characters. The block timestamp is read from the
//! clock once per mining attempt, before the nonce search starts, so a
//! fixed clock always produces the same block.

use thiserror::Error;
use tracing::debug;
use walletchain_core::{Block, BlockHeader, Clock, Hash, TransactionId};

/// A 256-bit digest has 64 hex characters.
pub const MAX_DIFFICULTY: usize = 64;

/// How often the search reports progress.
const PROGRESS_INTERVAL: u64 = 1 << 20;

/// Errors that can occur while sealing a block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("difficulty {difficulty} exceeds the maximum of {max}")]
    InvalidDifficulty { difficulty: usize, max: usize },

    #[error("nonce space exhausted while mining block {index}")]
    NonceSpaceExhausted { index: u64 },
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Leading-zero proof-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    /// Create a sealer for `difficulty` leading hex zeros.
    pub fn new(difficulty: usize) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ConsensusError::InvalidDifficulty {
                difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        Ok(Self { difficulty })
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// The hex prefix an accepted hash must start with.
    pub fn target_prefix(&self) -> String {
        "0".repeat(self.difficulty)
    }

    /// Check whether a hash meets the target.
    pub fn is_satisfied_by(&self, hash: &Hash) -> bool {
        hash.leading_hex_zeros() >= self.difficulty
    }

    /// Search nonces upward from the header's current nonce until the
    /// header hash meets the target, then seal the block.
    pub fn seal(&self, mut header: BlockHeader, transaction_ids: Vec<TransactionId>) -> Result<Block> {
        let start = header.nonce;
        loop {
            let hash = header.compute_hash();
            if self.is_satisfied_by(&hash) {
                debug!(
                    index = header.index,
                    nonce = header.nonce,
                    attempts = header.nonce - start + 1,
                    %hash,
                    "proof of work found"
                );
                return Ok(Block {
                    header,
                    hash,
                    transaction_ids,
                    difficulty: self.difficulty,
                });
            }
            if (header.nonce - start + 1) % PROGRESS_INTERVAL == 0 {
                debug!(index = header.index, nonce = header.nonce, "still mining");
            }
            header.nonce = header
                .nonce
                .checked_add(1)
                .ok_or(ConsensusError::NonceSpaceExhausted {
                    index: header.index,
                })?;
        }
    }

    /// Build and mine the block at `index` on top of `previous_hash`.
    pub fn mine(
        &self,
        index: u64,
        previous_hash: Option<Hash>,
        transaction_ids: Vec<TransactionId>,
        clock: &dyn Clock,
    ) -> Result<Block> {
        let header = BlockHeader::new(index, previous_hash, &transaction_ids, clock.now());
        self.seal(header, transaction_ids)
    }
}
