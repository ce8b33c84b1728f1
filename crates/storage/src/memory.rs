//! In-process ledger store.
//!
//! All state sits behind one `RwLock`. Writes hold the write lock for
//! the whole logical operation and validate everything before mutating
//! anything, so a refused write leaves no trace. Readers share the read
//! lock and always see whole writes.

use crate::db::{Result, StoreError};
use crate::store::{credits, expected_link, ChainTip, Conflict, LedgerStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use walletchain_core::{
    checked_total, Block, FinalizedTransaction, OutputId, Transaction, TransactionId, TransactionRecord,
    UnspentOutput, Wallet, WalletId,
};

#[derive(Debug, Default)]
struct MemoryState {
    wallets: BTreeMap<WalletId, Wallet>,
    outputs: HashMap<OutputId, UnspentOutput>,
    /// Unspent output ids per owner, in creation order.
    owners: HashMap<WalletId, Vec<OutputId>>,
    pending: HashMap<TransactionId, Transaction>,
    pending_order: Vec<TransactionId>,
    finalized: HashMap<TransactionId, FinalizedTransaction>,
    blocks: BTreeMap<u64, Block>,
    tip: Option<ChainTip>,
}

/// Ledger store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LedgerStore for MemoryLedger {
    fn register_wallet(&self, wallet: &Wallet) -> Result<()> {
        let mut state = self.write()?;
        if let Some(existing) = state.wallets.get(&wallet.id) {
            if existing.public_key != wallet.public_key {
                return Err(Conflict::WalletExists(wallet.id.clone()).into());
            }
            return Ok(());
        }
        state.wallets.insert(wallet.id.clone(), wallet.clone());
        Ok(())
    }

    fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        Ok(self.read()?.wallets.get(id).cloned())
    }

    fn list_wallet_ids(&self) -> Result<Vec<WalletId>> {
        Ok(self.read()?.wallets.keys().cloned().collect())
    }

    fn get_output(&self, id: &OutputId) -> Result<Option<UnspentOutput>> {
        Ok(self.read()?.outputs.get(id).cloned())
    }

    fn unspent_outputs(&self, wallet: &WalletId) -> Result<Vec<UnspentOutput>> {
        let state = self.read()?;
        let ids = match state.owners.get(wallet) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        ids.iter()
            .map(|id| {
                state.outputs.get(id).cloned().ok_or_else(|| {
                    StoreError::Corrupt(format!("owner index points at missing output {id}"))
                })
            })
            .collect()
    }

    fn commit_transfer(
        &self,
        spend_ids: &[OutputId],
        new_outputs: &[UnspentOutput],
        pending_tx: &Transaction,
    ) -> Result<()> {
        let mut state = self.write()?;

        // Validate everything first.
        if state.pending.contains_key(&pending_tx.id) || state.finalized.contains_key(&pending_tx.id)
        {
            return Err(Conflict::DuplicateTransaction(pending_tx.id).into());
        }
        let mut seen = HashSet::with_capacity(spend_ids.len());
        for id in spend_ids {
            let output = state
                .outputs
                .get(id)
                .ok_or(Conflict::MissingInput(*id))?;
            if output.spent || !seen.insert(*id) {
                return Err(Conflict::AlreadySpent(*id).into());
            }
            if output.owner != pending_tx.sender {
                return Err(Conflict::NotOwned(*id).into());
            }
        }
        let mut created = HashSet::with_capacity(new_outputs.len());
        for output in new_outputs {
            if state.outputs.contains_key(&output.id) || !created.insert(output.id) {
                return Err(Conflict::DuplicateOutput(output.id).into());
            }
        }
        for (owner, incoming) in credits(new_outputs)? {
            let held = state
                .owners
                .get(&owner)
                .into_iter()
                .flatten()
                .filter(|id| !seen.contains(*id))
                .filter_map(|id| state.outputs.get(id))
                .map(|o| o.amount);
            if checked_total(held.chain(Some(incoming))).is_none() {
                return Err(Conflict::BalanceOverflow(owner).into());
            }
        }

        // Apply.
        for id in spend_ids {
            if let Some(output) = state.outputs.get_mut(id) {
                output.spent = true;
            }
            if let Some(owned) = state.owners.get_mut(&pending_tx.sender) {
                owned.retain(|o| o != id);
            }
        }
        for output in new_outputs {
            state
                .owners
                .entry(output.owner.clone())
                .or_default()
                .push(output.id);
            state.outputs.insert(output.id, output.clone());
        }
        state.pending.insert(pending_tx.id, pending_tx.clone());
        state.pending_order.push(pending_tx.id);

        debug!(tx = %pending_tx.id, inputs = spend_ids.len(), outputs = new_outputs.len(), "committed transfer");
        Ok(())
    }

    fn list_pending_ids(&self) -> Result<Vec<TransactionId>> {
        Ok(self.read()?.pending_order.clone())
    }

    fn get_transaction(&self, id: &TransactionId) -> Result<Option<TransactionRecord>> {
        let state = self.read()?;
        if let Some(tx) = state.pending.get(id) {
            return Ok(Some(TransactionRecord::Pending(tx.clone())));
        }
        Ok(state
            .finalized
            .get(id)
            .cloned()
            .map(TransactionRecord::Finalized))
    }

    fn finalize(&self, ids: &[TransactionId], block: &Block) -> Result<()> {
        let mut state = self.write()?;

        let (index, previous_hash) = expected_link(state.tip.as_ref());
        if block.index() != index || block.previous_hash() != previous_hash {
            return Err(Conflict::StaleTip {
                block_index: block.index(),
                tip: state.tip,
            }
            .into());
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !state.pending.contains_key(id) || !seen.insert(*id) {
                return Err(Conflict::NotPending(*id).into());
            }
        }

        for id in ids {
            if let Some(transaction) = state.pending.remove(id) {
                state.finalized.insert(
                    *id,
                    FinalizedTransaction {
                        transaction,
                        block_hash: block.hash,
                        block_index: block.index(),
                    },
                );
            }
        }
        state.pending_order.retain(|id| !seen.contains(id));
        state.blocks.insert(block.index(), block.clone());
        state.tip = Some(ChainTip::of(block));

        debug!(index = block.index(), txs = ids.len(), "finalized block");
        Ok(())
    }

    fn get_chain_tip(&self) -> Result<Option<ChainTip>> {
        Ok(self.read()?.tip)
    }

    fn get_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.get(&index).cloned())
    }
}
