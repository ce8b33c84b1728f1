//! Durable ledger store on sled.
//!
//! Every record lives in the default tree under a prefixed key (see the
//! key helpers on [`Storage`]). Multi-record writes and multi-record
//! reads run inside `Tree::transaction`, which sled serializes against
//! every other transaction, so a spend race on one output has exactly
//! one winner.

use crate::db::{decode, encode, Result, Storage, StoreError};
use crate::store::{credits, expected_link, ChainTip, Conflict, LedgerStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use walletchain_core::{
    checked_total, Block, FinalizedTransaction, OutputId, Transaction, TransactionId, TransactionRecord,
    UnspentOutput, Wallet, WalletId,
};

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

fn abort<E: Into<StoreError>>(err: E) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

fn tx_get<T: DeserializeOwned>(tx: &TransactionalTree, key: &[u8]) -> TxResult<Option<T>> {
    match tx.get(key)? {
        Some(bytes) => decode(&bytes).map(Some).map_err(abort),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tx: &TransactionalTree, key: Vec<u8>, value: &T) -> TxResult<()> {
    let bytes = encode(value).map_err(abort)?;
    tx.insert(key, bytes)?;
    Ok(())
}

fn unwrap_tx<T>(result: std::result::Result<T, TransactionError<StoreError>>) -> Result<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StoreError::Database(err),
    })
}

/// Ledger store persisted in a sled database.
pub struct SledLedger {
    storage: Storage,
}

impl SledLedger {
    /// Open (or create) the ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(path)?,
        })
    }

    /// A throwaway ledger deleted on drop.
    pub fn open_temporary() -> Result<Self> {
        Ok(Self {
            storage: Storage::open_temporary()?,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }
}

impl LedgerStore for SledLedger {
    fn register_wallet(&self, wallet: &Wallet) -> Result<()> {
        let key = Storage::wallet_key(&wallet.id);
        unwrap_tx(self.storage.inner().transaction(|tx| {
            match tx_get::<Wallet>(tx, &key)? {
                Some(existing) if existing.public_key != wallet.public_key => {
                    Err(abort(Conflict::WalletExists(wallet.id.clone())))
                }
                Some(_) => Ok(()),
                None => tx_put(tx, key.clone(), wallet),
            }
        }))
    }

    fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        self.storage.get(Storage::wallet_key(id))
    }

    fn list_wallet_ids(&self) -> Result<Vec<WalletId>> {
        self.storage
            .keys_with_prefix(Storage::WALLET_PREFIX)?
            .into_iter()
            .map(|raw| {
                let s = String::from_utf8(raw)
                    .map_err(|e| StoreError::Corrupt(format!("wallet key: {e}")))?;
                WalletId::parse(&s).map_err(|e| StoreError::Corrupt(format!("wallet key: {e}")))
            })
            .collect()
    }

    fn get_output(&self, id: &OutputId) -> Result<Option<UnspentOutput>> {
        self.storage.get(Storage::output_key(id))
    }

    fn unspent_outputs(&self, wallet: &WalletId) -> Result<Vec<UnspentOutput>> {
        let owner_key = Storage::owner_key(wallet);
        unwrap_tx(self.storage.inner().transaction(|tx| {
            let ids: Vec<OutputId> = tx_get(tx, &owner_key)?.unwrap_or_default();
            let mut outputs = Vec::with_capacity(ids.len());
            for id in &ids {
                let output: UnspentOutput = tx_get(tx, &Storage::output_key(id))?.ok_or_else(|| {
                    abort(StoreError::Corrupt(format!(
                        "owner index points at missing output {id}"
                    )))
                })?;
                outputs.push(output);
            }
            Ok(outputs)
        }))
    }

    fn commit_transfer(
        &self,
        spend_ids: &[OutputId],
        new_outputs: &[UnspentOutput],
        pending_tx: &Transaction,
    ) -> Result<()> {
        let result = self.storage.inner().transaction(|tx| {
            if tx.get(Storage::pending_tx_key(&pending_tx.id))?.is_some()
                || tx.get(Storage::finalized_tx_key(&pending_tx.id))?.is_some()
            {
                return Err(abort(Conflict::DuplicateTransaction(pending_tx.id)));
            }

            let mut seen = HashSet::with_capacity(spend_ids.len());
            for id in spend_ids {
                let key = Storage::output_key(id);
                let mut output: UnspentOutput =
                    tx_get(tx, &key)?.ok_or_else(|| abort(Conflict::MissingInput(*id)))?;
                if output.spent || !seen.insert(*id) {
                    return Err(abort(Conflict::AlreadySpent(*id)));
                }
                if output.owner != pending_tx.sender {
                    return Err(abort(Conflict::NotOwned(*id)));
                }
                output.spent = true;
                tx_put(tx, key, &output)?;
            }

            let sender_key = Storage::owner_key(&pending_tx.sender);
            if !spend_ids.is_empty() {
                let mut owned: Vec<OutputId> = tx_get(tx, &sender_key)?.unwrap_or_default();
                owned.retain(|o| !seen.contains(o));
                tx_put(tx, sender_key, &owned)?;
            }

            for output in new_outputs {
                let key = Storage::output_key(&output.id);
                if tx.get(&key)?.is_some() {
                    return Err(abort(Conflict::DuplicateOutput(output.id)));
                }
                tx_put(tx, key, output)?;
            }

            for (owner, incoming) in credits(new_outputs).map_err(abort)? {
                let owner_key = Storage::owner_key(&owner);
                let mut owned: Vec<OutputId> = tx_get(tx, &owner_key)?.unwrap_or_default();
                let mut held = Vec::with_capacity(owned.len() + 1);
                for id in &owned {
                    let output: UnspentOutput = tx_get(tx, &Storage::output_key(id))?
                        .ok_or_else(|| {
                            abort(StoreError::Corrupt(format!(
                                "owner index points at missing output {id}"
                            )))
                        })?;
                    held.push(output.amount);
                }
                held.push(incoming);
                if checked_total(held).is_none() {
                    return Err(abort(Conflict::BalanceOverflow(owner)));
                }

                owned.extend(new_outputs.iter().filter(|o| o.owner == owner).map(|o| o.id));
                tx_put(tx, owner_key, &owned)?;
            }

            tx_put(tx, Storage::pending_tx_key(&pending_tx.id), pending_tx)?;
            let mut pending: Vec<TransactionId> =
                tx_get(tx, Storage::PENDING_INDEX_KEY)?.unwrap_or_default();
            pending.push(pending_tx.id);
            tx_put(tx, Storage::PENDING_INDEX_KEY.to_vec(), &pending)?;
            Ok(())
        });
        unwrap_tx(result)?;

        debug!(tx = %pending_tx.id, inputs = spend_ids.len(), outputs = new_outputs.len(), "committed transfer");
        Ok(())
    }

    fn list_pending_ids(&self) -> Result<Vec<TransactionId>> {
        Ok(self
            .storage
            .get(Storage::PENDING_INDEX_KEY)?
            .unwrap_or_default())
    }

    fn get_transaction(&self, id: &TransactionId) -> Result<Option<TransactionRecord>> {
        let pending_key = Storage::pending_tx_key(id);
        let finalized_key = Storage::finalized_tx_key(id);
        unwrap_tx(self.storage.inner().transaction(|tx| {
            if let Some(pending) = tx_get::<Transaction>(tx, &pending_key)? {
                return Ok(Some(TransactionRecord::Pending(pending)));
            }
            Ok(tx_get::<FinalizedTransaction>(tx, &finalized_key)?
                .map(TransactionRecord::Finalized))
        }))
    }

    fn finalize(&self, ids: &[TransactionId], block: &Block) -> Result<()> {
        let result = self.storage.inner().transaction(|tx| {
            let tip: Option<ChainTip> = tx_get(tx, Storage::CHAIN_TIP_KEY)?;
            let (index, previous_hash) = expected_link(tip.as_ref());
            if block.index() != index || block.previous_hash() != previous_hash {
                return Err(abort(Conflict::StaleTip {
                    block_index: block.index(),
                    tip,
                }));
            }

            let mut seen = HashSet::with_capacity(ids.len());
            for id in ids {
                let pending_key = Storage::pending_tx_key(id);
                let transaction: Transaction = match tx_get(tx, &pending_key)? {
                    Some(t) if seen.insert(*id) => t,
                    _ => return Err(abort(Conflict::NotPending(*id))),
                };
                tx.remove(pending_key)?;
                tx_put(
                    tx,
                    Storage::finalized_tx_key(id),
                    &FinalizedTransaction {
                        transaction,
                        block_hash: block.hash,
                        block_index: block.index(),
                    },
                )?;
            }

            let mut pending: Vec<TransactionId> =
                tx_get(tx, Storage::PENDING_INDEX_KEY)?.unwrap_or_default();
            pending.retain(|id| !seen.contains(id));
            tx_put(tx, Storage::PENDING_INDEX_KEY.to_vec(), &pending)?;

            tx_put(tx, Storage::block_index_key(block.index()), block)?;
            tx_put(tx, Storage::CHAIN_TIP_KEY.to_vec(), &ChainTip::of(block))?;
            Ok(())
        });
        unwrap_tx(result)?;

        debug!(index = block.index(), txs = ids.len(), "finalized block");
        Ok(())
    }

    fn get_chain_tip(&self) -> Result<Option<ChainTip>> {
        self.storage.get(Storage::CHAIN_TIP_KEY)
    }

    fn get_block(&self, index: u64) -> Result<Option<Block>> {
        self.storage.get(Storage::block_index_key(index))
    }
}
