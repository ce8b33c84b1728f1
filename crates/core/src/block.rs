//! Blocks and block headers.

use crate::clock::format_timestamp;
use crate::hash::{hash_concat, Hash};
use crate::merkle::merkle_root;
use crate::transaction::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index of the first block in the chain.
pub const FIRST_BLOCK_INDEX: u64 = 1;

/// The hashed part of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position in the chain, starting at 1.
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    /// Hash of block `index - 1`; `None` for the first block.
    pub previous_hash: Option<Hash>,
    pub merkle_root: Hash,
    pub nonce: u64,
}

impl BlockHeader {
    /// Build the header for a candidate block over `transaction_ids`.
    pub fn new(
        index: u64,
        previous_hash: Option<Hash>,
        transaction_ids: &[TransactionId],
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            timestamp,
            previous_hash,
            merkle_root: merkle_root(transaction_ids),
            nonce: 0,
        }
    }

    /// Hash the header.
    ///
    /// Input is the concatenation of: previous hash hex (empty for the
    /// first block), timestamp in RFC 3339 nanoseconds, merkle root
    /// hex, index in decimal, nonce in decimal.
    pub fn compute_hash(&self) -> Hash {
        let previous = self
            .previous_hash
            .map(|h| h.to_hex())
            .unwrap_or_default();
        hash_concat(&[
            previous.as_bytes(),
            format_timestamp(&self.timestamp).as_bytes(),
            self.merkle_root.to_hex().as_bytes(),
            self.index.to_string().as_bytes(),
            self.nonce.to_string().as_bytes(),
        ])
    }
}

/// A sealed block. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub hash: Hash,
    /// Included transactions, in merkle order.
    pub transaction_ids: Vec<TransactionId>,
    /// Leading hex zeros the block was mined for. Not hashed.
    pub difficulty: usize,
}

impl Block {
    /// Seal a header whose hash has already been found at `difficulty`.
    pub fn seal(header: BlockHeader, transaction_ids: Vec<TransactionId>, difficulty: usize) -> Self {
        let hash = header.compute_hash();
        Self {
            header,
            hash,
            transaction_ids,
            difficulty,
        }
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn previous_hash(&self) -> Option<Hash> {
        self.header.previous_hash
    }

    pub fn is_first(&self) -> bool {
        self.header.index == FIRST_BLOCK_INDEX && self.header.previous_hash.is_none()
    }

    pub fn tx_count(&self) -> usize {
        self.transaction_ids.len()
    }

    /// The stored hash matches the header.
    pub fn verify_hash(&self) -> bool {
        self.header.compute_hash() == self.hash
    }

    /// The stored merkle root matches the transaction id list.
    pub fn verify_merkle_root(&self) -> bool {
        merkle_root(&self.transaction_ids) == self.header.merkle_root
    }

    /// The hash has at least `difficulty` leading hex zeros.
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.hash.leading_hex_zeros() >= difficulty
    }

    /// The hash meets the difficulty the block records.
    pub fn meets_own_difficulty(&self) -> bool {
        self.meets_difficulty(self.difficulty)
    }
}
