//! Transfer transactions and the canonical signed message.

use crate::clock::format_timestamp;
use crate::crypto::{PublicKey, Signature};
use crate::hash::{hash, Hash};
use crate::utxo::{checked_total, OutputId};
use crate::wallet::WalletId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between fields of the canonical message. Never allowed
/// inside a field.
pub const FIELD_SEPARATOR: char = '|';

/// Identifier of a transaction, see [`transaction_id`].
pub type TransactionId = Hash;

/// Errors that can occur while building transaction messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("field '{0}' contains the reserved separator '|'")]
    ReservedSeparator(&'static str),
}

/// The exact bytes a client signs:
/// `sender|receiver|amount|timestamp|note`, amount in decimal.
///
/// This layout is frozen; client signing code depends on it.
pub fn canonical_message(
    sender: &str,
    receiver: &str,
    amount: u64,
    timestamp: &str,
    note: &str,
) -> Result<String, TransactionError> {
    for (name, value) in [
        ("sender", sender),
        ("receiver", receiver),
        ("timestamp", timestamp),
        ("note", note),
    ] {
        if value.contains(FIELD_SEPARATOR) {
            return Err(TransactionError::ReservedSeparator(name));
        }
    }
    Ok(format!("{sender}|{receiver}|{amount}|{timestamp}|{note}"))
}

/// Id of a transaction admitted at `admitted_at`.
///
/// Blake3 over the same `|`-joined layout as the signed message, with
/// the admission time in RFC 3339 nanosecond form.
pub fn transaction_id(
    sender: &WalletId,
    receiver: &WalletId,
    amount: u64,
    admitted_at: &DateTime<Utc>,
    note: &str,
) -> TransactionId {
    let material = format!(
        "{}|{}|{}|{}|{}",
        sender,
        receiver,
        amount,
        format_timestamp(admitted_at),
        note
    );
    hash(material.as_bytes())
}

/// One output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub recipient: WalletId,
    pub amount: u64,
}

/// A transfer between wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender: WalletId,
    pub receiver: WalletId,
    pub amount: u64,
    pub note: String,
    /// When the ledger admitted the transaction.
    pub timestamp: DateTime<Utc>,
    /// The timestamp string the client signed.
    pub signed_timestamp: String,
    /// `None` for system funding.
    pub sender_public_key: Option<PublicKey>,
    /// `None` for system funding.
    pub signature: Option<Signature>,
    /// Consumed outputs, in request order.
    pub inputs: Vec<OutputId>,
    /// Created outputs; index `i` here is output index `i`.
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Whether this is a system-funding transaction (no inputs, no signature).
    pub fn is_system_funding(&self) -> bool {
        self.sender.is_system()
    }

    /// Sum of all output amounts, `None` on overflow.
    pub fn output_total(&self) -> Option<u64> {
        checked_total(self.outputs.iter().map(|o| o.amount))
    }

    /// Rebuild the message the sender signed.
    pub fn signing_message(&self) -> Result<String, TransactionError> {
        canonical_message(
            self.sender.as_str(),
            self.receiver.as_str(),
            self.amount,
            &self.signed_timestamp,
            &self.note,
        )
    }
}

/// A transaction bound to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    pub transaction: Transaction,
    pub block_hash: Hash,
    pub block_index: u64,
}

/// A stored transaction in either lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRecord {
    Pending(Transaction),
    Finalized(FinalizedTransaction),
}

impl TransactionRecord {
    pub fn transaction(&self) -> &Transaction {
        match self {
            TransactionRecord::Pending(tx) => tx,
            TransactionRecord::Finalized(f) => &f.transaction,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionRecord::Pending(_))
    }
}
