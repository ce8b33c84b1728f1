//! The ledger store contract shared by every backend.

use crate::db::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use walletchain_core::{
    checked_total, Block, Hash, OutputId, Transaction, TransactionId, TransactionRecord, UnspentOutput, Wallet,
    WalletId,
};

/// Index and hash of the newest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub index: u64,
    pub hash: Hash,
}

impl ChainTip {
    pub fn of(block: &Block) -> Self {
        Self {
            index: block.index(),
            hash: block.hash,
        }
    }
}

/// Why an atomic write was refused. The store is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// A different key is already registered under this id.
    WalletExists(WalletId),
    MissingInput(OutputId),
    AlreadySpent(OutputId),
    NotOwned(OutputId),
    DuplicateOutput(OutputId),
    DuplicateTransaction(TransactionId),
    NotPending(TransactionId),
    /// The wallet's unspent total would no longer fit in a `u64`.
    BalanceOverflow(WalletId),
    /// The block does not extend the current tip.
    StaleTip {
        block_index: u64,
        tip: Option<ChainTip>,
    },
}

impl Conflict {
    /// The input that lost a spend race, when the conflict names one.
    pub fn contested_input(&self) -> Option<OutputId> {
        match self {
            Conflict::MissingInput(id) | Conflict::AlreadySpent(id) | Conflict::NotOwned(id) => {
                Some(*id)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::WalletExists(id) => write!(f, "wallet {id} already registered"),
            Conflict::MissingInput(id) => write!(f, "input {id} does not exist"),
            Conflict::AlreadySpent(id) => write!(f, "input {id} already spent"),
            Conflict::NotOwned(id) => write!(f, "input {id} not owned by sender"),
            Conflict::DuplicateOutput(id) => write!(f, "output {id} already exists"),
            Conflict::DuplicateTransaction(id) => write!(f, "transaction {id} already exists"),
            Conflict::NotPending(id) => write!(f, "transaction {id} is not pending"),
            Conflict::BalanceOverflow(id) => write!(f, "holdings of {id} would overflow"),
            Conflict::StaleTip { block_index, tip } => match tip {
                Some(tip) => write!(
                    f,
                    "block {block_index} does not extend tip {} ({})",
                    tip.index, tip.hash
                ),
                None => write!(f, "block {block_index} does not start an empty chain"),
            },
        }
    }
}

/// Durable record of wallets, outputs, transactions and blocks.
///
/// Every method is one atomic unit with respect to every other method.
/// Writes either apply completely or leave the store untouched; reads
/// never observe a half-applied write. Spend conflicts are detected
/// here, not by callers, so the guarantee holds for any backend.
pub trait LedgerStore: Send + Sync {
    /// Register a wallet. Re-registering the same key is a no-op.
    fn register_wallet(&self, wallet: &Wallet) -> Result<()>;

    fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>>;

    fn list_wallet_ids(&self) -> Result<Vec<WalletId>>;

    fn get_output(&self, id: &OutputId) -> Result<Option<UnspentOutput>>;

    /// Unspent outputs owned by `wallet`, from one consistent view.
    fn unspent_outputs(&self, wallet: &WalletId) -> Result<Vec<UnspentOutput>>;

    /// Sum of the wallet's unspent outputs.
    fn balance(&self, wallet: &WalletId) -> Result<u64> {
        let outputs = self.unspent_outputs(wallet)?;
        checked_total(outputs.iter().map(|o| o.amount))
            .ok_or_else(|| StoreError::Corrupt(format!("holdings of {wallet} overflow u64")))
    }

    /// Atomically mark `spend_ids` spent, create `new_outputs` and
    /// record `pending_tx` as pending.
    ///
    /// Each spent id must exist, be unspent and be owned by
    /// `pending_tx.sender`, and no owner's unspent total may exceed
    /// `u64::MAX` afterwards. Otherwise the call fails with a
    /// [`Conflict`] and nothing changes.
    fn commit_transfer(
        &self,
        spend_ids: &[OutputId],
        new_outputs: &[UnspentOutput],
        pending_tx: &Transaction,
    ) -> Result<()>;

    /// Pending transaction ids in admission order.
    fn list_pending_ids(&self) -> Result<Vec<TransactionId>>;

    fn get_transaction(&self, id: &TransactionId) -> Result<Option<TransactionRecord>>;

    /// Atomically persist `block`, move exactly `ids` from pending to
    /// finalized, and advance the tip.
    fn finalize(&self, ids: &[TransactionId], block: &Block) -> Result<()>;

    fn get_chain_tip(&self) -> Result<Option<ChainTip>>;

    fn get_block(&self, index: u64) -> Result<Option<Block>>;
}

/// Block index and previous hash the next block must carry.
pub(crate) fn expected_link(tip: Option<&ChainTip>) -> (u64, Option<Hash>) {
    match tip {
        Some(tip) => (tip.index + 1, Some(tip.hash)),
        None => (walletchain_core::FIRST_BLOCK_INDEX, None),
    }
}

/// Amount credited to each owner by `outputs`, in first-seen order.
pub(crate) fn credits(
    outputs: &[UnspentOutput],
) -> std::result::Result<Vec<(WalletId, u64)>, Conflict> {
    let mut credits: Vec<(WalletId, u64)> = Vec::new();
    for output in outputs {
        match credits.iter_mut().find(|(owner, _)| owner == &output.owner) {
            Some((owner, total)) => {
                *total = total
                    .checked_add(output.amount)
                    .ok_or_else(|| Conflict::BalanceOverflow(owner.clone()))?;
            }
            None => credits.push((output.owner.clone(), output.amount)),
        }
    }
    Ok(credits)
}
