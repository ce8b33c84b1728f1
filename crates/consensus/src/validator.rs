//! Stored-chain validation.
//!
//! Walks blocks in index order and reports every problem it finds
//! instead of stopping at the first one. Problems are reported, never
//! repaired.

use std::collections::HashSet;
use thiserror::Error;
use walletchain_core::{Block, Hash, TransactionId, FIRST_BLOCK_INDEX};

/// One defect found in the stored chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainProblem {
    #[error("block {index} is missing")]
    MissingBlock { index: u64 },

    #[error("expected block {expected}, found block {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("previous_hash mismatch at block {index}")]
    BrokenLink {
        index: u64,
        expected: Option<Hash>,
        found: Option<Hash>,
    },

    #[error("hash mismatch at block {index} (stored {stored}, computed {computed})")]
    HashMismatch {
        index: u64,
        stored: Hash,
        computed: Hash,
    },

    #[error("merkle root mismatch at block {index}")]
    MerkleMismatch { index: u64 },

    #[error("block {index} does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: usize },

    #[error("transaction {id} appears more than once (block {index})")]
    DuplicateTransaction { index: u64, id: TransactionId },

    #[error("chain tip {tip} does not match the last stored block")]
    TipMismatch { tip: Hash },
}

/// Checks hash linkage, recomputed digests and work.
///
/// Each block is held to the difficulty it records, so changing the
/// configured difficulty never invalidates blocks mined earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidator;

impl ChainValidator {
    pub fn new() -> Self {
        Self
    }

    /// Problems with one block, given the index and previous hash it
    /// should carry.
    pub fn check_block(
        &self,
        block: &Block,
        expected_index: u64,
        expected_previous: Option<Hash>,
    ) -> Vec<ChainProblem> {
        let mut problems = Vec::new();
        let index = block.index();

        if index != expected_index {
            problems.push(ChainProblem::IndexMismatch {
                expected: expected_index,
                found: index,
            });
        }
        if block.previous_hash() != expected_previous {
            problems.push(ChainProblem::BrokenLink {
                index,
                expected: expected_previous,
                found: block.previous_hash(),
            });
        }

        let computed = block.header.compute_hash();
        if computed != block.hash {
            problems.push(ChainProblem::HashMismatch {
                index,
                stored: block.hash,
                computed,
            });
        }
        if !block.verify_merkle_root() {
            problems.push(ChainProblem::MerkleMismatch { index });
        }
        if !block.meets_own_difficulty() {
            problems.push(ChainProblem::InsufficientWork {
                index,
                difficulty: block.difficulty,
            });
        }
        problems
    }

    /// Validate a chain given in ascending order, starting at the first
    /// block.
    pub fn validate<'a, I>(&self, blocks: I) -> Vec<ChainProblem>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut problems = Vec::new();
        let mut expected_index = FIRST_BLOCK_INDEX;
        let mut expected_previous = None;
        let mut seen = HashSet::new();

        for block in blocks {
            problems.extend(self.check_block(block, expected_index, expected_previous));
            for id in &block.transaction_ids {
                if !seen.insert(*id) {
                    problems.push(ChainProblem::DuplicateTransaction {
                        index: block.index(),
                        id: *id,
                    });
                }
            }
            expected_index = block.index() + 1;
            expected_previous = Some(block.hash);
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::ProofOfWork;
    use chrono::{TimeZone, Utc};
    use walletchain_core::{hash, ManualClock};

    fn chain(len: u64, difficulty: usize) -> Vec<Block> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let pow = ProofOfWork::new(difficulty).unwrap();
        let mut blocks: Vec<Block> = Vec::new();
        for index in 1..=len {
            let previous = blocks.last().map(|b| b.hash);
            let ids = vec![hash(format!("tx-{index}").as_bytes())];
            blocks.push(pow.mine(index, previous, ids, &clock).unwrap());
        }
        blocks
    }

    #[test]
    fn test_valid_chain_has_no_problems() {
        let blocks = chain(4, 1);
        assert!(ChainValidator::new().validate(&blocks).is_empty());
        assert!(ChainValidator::default().validate(&[]).is_empty());
    }

    #[test]
    fn test_broken_link_detected() {
        let mut blocks = chain(3, 0);
        blocks[2].header.previous_hash = Some(hash(b"elsewhere"));
        blocks[2].hash = blocks[2].header.compute_hash();

        let problems = ChainValidator::default().validate(&blocks);
        assert_eq!(problems.len(), 1);
        assert!(matches!(problems[0], ChainProblem::BrokenLink { index: 3, .. }));
    }

    #[test]
    fn test_tampered_contents_detected() {
        let mut blocks = chain(2, 0);
        blocks[0].transaction_ids.push(hash(b"smuggled"));

        let problems = ChainValidator::default().validate(&blocks);
        assert_eq!(problems, vec![ChainProblem::MerkleMismatch { index: 1 }]);
    }

    #[test]
    fn test_tampered_header_detected() {
        let mut blocks = chain(2, 0);
        blocks[1].header.nonce += 1;

        let problems = ChainValidator::default().validate(&blocks);
        assert!(matches!(problems[0], ChainProblem::HashMismatch { index: 2, .. }));
    }

    #[test]
    fn test_gap_detected() {
        let blocks = chain(3, 0);
        let gapped = [blocks[0].clone(), blocks[2].clone()];

        let problems = ChainValidator::default().validate(&gapped);
        assert!(problems.contains(&ChainProblem::IndexMismatch {
            expected: 2,
            found: 3
        }));
    }

    #[test]
    fn test_insufficient_work_detected() {
        let mut blocks = chain(2, 0);
        // claims work its hash does not carry
        blocks[0].difficulty = 64;
        let problems = ChainValidator::new().validate(&blocks);
        assert_eq!(
            problems,
            vec![ChainProblem::InsufficientWork {
                index: 1,
                difficulty: 64
            }]
        );
    }

    #[test]
    fn test_blocks_mined_at_mixed_difficulties_are_valid() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let easy = ProofOfWork::new(0).unwrap();
        let hard = ProofOfWork::new(2).unwrap();
        let first = easy.mine(1, None, vec![hash(b"a")], &clock).unwrap();
        let second = hard.mine(2, Some(first.hash), vec![hash(b"b")], &clock).unwrap();
        let third = easy.mine(3, Some(second.hash), vec![hash(b"c")], &clock).unwrap();

        assert!(ChainValidator::new().validate(&[first, second, third]).is_empty());
    }

    #[test]
    fn test_duplicate_transaction_detected() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let pow = ProofOfWork::new(0).unwrap();
        let id = hash(b"tx");
        let first = pow.mine(1, None, vec![id], &clock).unwrap();
        let second = pow.mine(2, Some(first.hash), vec![id], &clock).unwrap();

        let problems = ChainValidator::default().validate(&[first, second]);
        assert_eq!(
            problems,
            vec![ChainProblem::DuplicateTransaction { index: 2, id }]
        );
    }
}
