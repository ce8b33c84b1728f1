//! The ledger facade.
//!
//! Ties a [`LedgerStore`], a [`Clock`] and a difficulty together and
//! exposes every ledger operation: registration, admission, funding,
//! finalization and the read side.

use crate::admission::{AdmissionEngine, TransferRequest};
use crate::config::{validate_difficulty, LedgerConfig};
use crate::error::{LedgerError, Result};
use crate::finalization::{FinalizationEngine, FinalizationOutcome};
use serde::Serialize;
use tracing::info;
use walletchain_consensus::{ChainProblem, ChainValidator};
use walletchain_core::{
    checked_total, Block, Clock, Hash, OutputId, PublicKey, Transaction, TransactionId, TransactionRecord,
    UnspentOutput, Wallet, WalletId, FIRST_BLOCK_INDEX,
};
use walletchain_storage::{ChainTip, Conflict, LedgerStore, StoreError};

/// A wallet with its spendable outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub id: WalletId,
    pub public_key: String,
    pub balance: u64,
    pub utxos: Vec<UnspentOutput>,
}

/// Ledger statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Index of the newest block, 0 for an empty chain.
    pub height: u64,
    pub tip_hash: Option<Hash>,
    pub pending_transactions: usize,
    pub wallets: usize,
    pub difficulty: usize,
}

/// Summary of a clean chain validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub blocks_checked: u64,
    pub tip: Option<ChainTip>,
}

/// Main entry point to the ledger.
pub struct Ledger<'a> {
    store: &'a dyn LedgerStore,
    clock: &'a dyn Clock,
    difficulty: usize,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn LedgerStore, clock: &'a dyn Clock, difficulty: usize) -> Result<Self> {
        validate_difficulty(difficulty)?;
        Ok(Self {
            store,
            clock,
            difficulty,
        })
    }

    pub fn from_config(
        store: &'a dyn LedgerStore,
        clock: &'a dyn Clock,
        config: &LedgerConfig,
    ) -> Result<Self> {
        Self::new(store, clock, config.difficulty)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn store(&self) -> &'a dyn LedgerStore {
        self.store
    }

    pub fn admission(&self) -> AdmissionEngine<'a> {
        AdmissionEngine::new(self.store, self.clock)
    }

    pub fn finalization(&self) -> FinalizationEngine<'a> {
        FinalizationEngine::new(self.store, self.clock)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Register a wallet for a hex-encoded public key. The id defaults to
    /// one derived from the key.
    pub fn register_wallet(&self, public_key: &str, wallet_id: Option<&str>) -> Result<WalletId> {
        let public_key = PublicKey::from_hex(public_key.trim())?;
        let id = wallet_id.map(WalletId::parse).transpose()?;
        let wallet = Wallet::new(public_key, id);

        match self.store.register_wallet(&wallet) {
            Ok(()) => {}
            Err(StoreError::Conflict(Conflict::WalletExists(id))) => {
                return Err(LedgerError::Authentication(format!(
                    "wallet {id} is registered to a different key"
                )));
            }
            Err(err) => return Err(err.into()),
        }
        info!(wallet = %wallet.id, "wallet registered");
        Ok(wallet.id)
    }

    pub fn admit(&self, request: &TransferRequest) -> Result<TransactionId> {
        self.admission().admit(request)
    }

    pub fn fund(&self, receiver: &str, amount: u64, note: Option<&str>) -> Result<TransactionId> {
        self.admission().fund(receiver, amount, note)
    }

    /// Seal the pending pool at the configured difficulty.
    pub fn finalize(&self) -> Result<FinalizationOutcome> {
        self.finalization().finalize(self.difficulty)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Sum of the wallet's unspent outputs. Unknown wallets hold nothing.
    pub fn balance(&self, wallet: &str) -> Result<u64> {
        Ok(self.store.balance(&WalletId::parse(wallet)?)?)
    }

    /// A registered wallet with its balance and unspent outputs.
    pub fn wallet(&self, wallet: &str) -> Result<WalletView> {
        let id = WalletId::parse(wallet)?;
        let registered = self
            .store
            .get_wallet(&id)?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet {id}")))?;
        let utxos = self.store.unspent_outputs(&id)?;
        let balance = checked_total(utxos.iter().map(|o| o.amount))
            .ok_or_else(|| StoreError::Corrupt(format!("holdings of {id} overflow u64")))?;
        Ok(WalletView {
            balance,
            public_key: registered.public_key.to_hex(),
            id,
            utxos,
        })
    }

    pub fn wallets(&self) -> Result<Vec<WalletId>> {
        Ok(self.store.list_wallet_ids()?)
    }

    pub fn output(&self, id: &OutputId) -> Result<UnspentOutput> {
        self.store
            .get_output(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("output {id}")))
    }

    pub fn transaction(&self, id: &TransactionId) -> Result<TransactionRecord> {
        self.store
            .get_transaction(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {id}")))
    }

    /// Pending transactions in admission order.
    pub fn pending(&self) -> Result<Vec<Transaction>> {
        let mut pending = Vec::new();
        for id in self.store.list_pending_ids()? {
            // finalized since the id list was read
            if let Some(TransactionRecord::Pending(tx)) = self.store.get_transaction(&id)? {
                pending.push(tx);
            }
        }
        Ok(pending)
    }

    pub fn chain_tip(&self) -> Result<Option<ChainTip>> {
        Ok(self.store.get_chain_tip()?)
    }

    pub fn block(&self, index: u64) -> Result<Block> {
        self.store
            .get_block(index)?
            .ok_or_else(|| LedgerError::NotFound(format!("block {index}")))
    }

    /// Up to `count` blocks, newest first.
    pub fn recent_blocks(&self, count: usize) -> Result<Vec<Block>> {
        let tip = match self.store.get_chain_tip()? {
            Some(tip) => tip,
            None => return Ok(Vec::new()),
        };
        let mut blocks = Vec::with_capacity(count.min(tip.index as usize));
        let mut index = tip.index;
        while index >= FIRST_BLOCK_INDEX && blocks.len() < count {
            if let Some(block) = self.store.get_block(index)? {
                blocks.push(block);
            }
            index -= 1;
        }
        Ok(blocks)
    }

    /// Walk every stored block, recomputing digests and checking
    /// linkage and the work each block records. Problems are returned
    /// as [`LedgerError::ChainLinkage`].
    pub fn validate_chain(&self) -> Result<ChainReport> {
        let tip = match self.store.get_chain_tip()? {
            Some(tip) => tip,
            None => {
                return Ok(ChainReport {
                    blocks_checked: 0,
                    tip: None,
                })
            }
        };

        let mut problems = Vec::new();
        let mut blocks = Vec::with_capacity(tip.index as usize);
        for index in FIRST_BLOCK_INDEX..=tip.index {
            match self.store.get_block(index)? {
                Some(block) => blocks.push(block),
                None => problems.push(ChainProblem::MissingBlock { index }),
            }
        }

        problems.extend(ChainValidator::new().validate(&blocks));
        if blocks.last().map(|b| b.hash) != Some(tip.hash) {
            problems.push(ChainProblem::TipMismatch { tip: tip.hash });
        }

        if !problems.is_empty() {
            return Err(LedgerError::ChainLinkage(problems));
        }
        Ok(ChainReport {
            blocks_checked: blocks.len() as u64,
            tip: Some(tip),
        })
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let tip = self.store.get_chain_tip()?;
        Ok(LedgerStats {
            height: tip.map(|t| t.index).unwrap_or(0),
            tip_hash: tip.map(|t| t.hash),
            pending_transactions: self.store.list_pending_ids()?.len(),
            wallets: self.store.list_wallet_ids()?.len(),
            difficulty: self.difficulty,
        })
    }
}
