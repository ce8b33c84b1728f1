//! Block finalization.
//!
//! Snapshots the pending pool, mines a block over exactly those ids
//! and hands both to the store in one atomic call. Transactions admitted
//! after the snapshot stay pending for the next block. If the store
//! refuses the block, nothing moves and the same ids can be retried.

use crate::error::Result;
use tracing::{debug, info, warn};
use walletchain_consensus::ProofOfWork;
use walletchain_core::{Block, Clock, FIRST_BLOCK_INDEX};
use walletchain_storage::LedgerStore;

/// What a finalization run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationOutcome {
    Sealed(Block),
    /// The pending pool was empty.
    NothingToFinalize,
}

impl FinalizationOutcome {
    pub fn block(&self) -> Option<&Block> {
        match self {
            FinalizationOutcome::Sealed(block) => Some(block),
            FinalizationOutcome::NothingToFinalize => None,
        }
    }
}

/// Seals pending transactions into proof-of-work blocks.
pub struct FinalizationEngine<'a> {
    store: &'a dyn LedgerStore,
    clock: &'a dyn Clock,
}

impl<'a> FinalizationEngine<'a> {
    pub fn new(store: &'a dyn LedgerStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Seal every currently pending transaction into the next block.
    pub fn finalize(&self, difficulty: usize) -> Result<FinalizationOutcome> {
        let pow = ProofOfWork::new(difficulty)?;

        let ids = self.store.list_pending_ids()?;
        if ids.is_empty() {
            debug!("nothing to finalize");
            return Ok(FinalizationOutcome::NothingToFinalize);
        }

        let (index, previous_hash) = match self.store.get_chain_tip()? {
            Some(tip) => (tip.index + 1, Some(tip.hash)),
            None => (FIRST_BLOCK_INDEX, None),
        };
        debug!(index, txs = ids.len(), difficulty, "mining block");
        let block = pow.mine(index, previous_hash, ids.clone(), self.clock)?;

        if let Err(err) = self.store.finalize(&ids, &block) {
            warn!(index, error = %err, "block not persisted; transactions remain pending");
            return Err(err.into());
        }

        info!(
            index,
            hash = %block.hash,
            nonce = block.header.nonce,
            txs = ids.len(),
            "block sealed"
        );
        Ok(FinalizationOutcome::Sealed(block))
    }
}
