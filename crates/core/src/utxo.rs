//! Unspent transaction outputs.

use crate::hash::{hash_concat, Hash};
use crate::transaction::TransactionId;
use crate::wallet::WalletId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an output, see [`output_id`].
pub type OutputId = Hash;

/// Id of output `index` of transaction `tx_id`.
///
/// `blake3(tx_id ‖ index as u32 big-endian)`. A pure function of the
/// pair, so re-creating an output always lands on the same record.
pub fn output_id(tx_id: &TransactionId, index: u32) -> OutputId {
    hash_concat(&[tx_id.as_bytes(), &index.to_be_bytes()])
}

/// Sum of `amounts`, or `None` if it does not fit in a `u64`.
pub fn checked_total<I: IntoIterator<Item = u64>>(amounts: I) -> Option<u64> {
    amounts
        .into_iter()
        .try_fold(0u64, |total, amount| total.checked_add(amount))
}

/// A discrete amount of value owned by one wallet until spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub id: OutputId,
    pub tx_id: TransactionId,
    pub output_index: u32,
    pub owner: WalletId,
    /// Minor units.
    pub amount: u64,
    /// Flips to `true` once, when a transfer consumes it.
    pub spent: bool,
    pub created_at: DateTime<Utc>,
}

impl UnspentOutput {
    /// Create a fresh, unspent output for `(tx_id, index)`.
    pub fn new(
        tx_id: TransactionId,
        output_index: u32,
        owner: WalletId,
        amount: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: output_id(&tx_id, output_index),
            tx_id,
            output_index,
            owner,
            amount,
            spent: false,
            created_at,
        }
    }

    /// Whether `wallet` may spend this output right now.
    pub fn is_spendable_by(&self, wallet: &WalletId) -> bool {
        !self.spent && &self.owner == wallet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;
    use chrono::TimeZone;

    fn alice() -> WalletId {
        WalletId::parse("alice").unwrap()
    }

    #[test]
    fn test_output_id_is_pure() {
        let tx = hash(b"tx");
        assert_eq!(output_id(&tx, 0), output_id(&tx, 0));
        assert_ne!(output_id(&tx, 0), output_id(&tx, 1));
        assert_ne!(output_id(&tx, 0), output_id(&hash(b"other"), 0));
    }

    #[test]
    fn test_new_output_uses_derived_id() {
        let tx = hash(b"tx");
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let out = UnspentOutput::new(tx, 1, alice(), 250, at);
        assert_eq!(out.id, output_id(&tx, 1));
        assert!(!out.spent);
    }

    #[test]
    fn test_checked_total() {
        assert_eq!(checked_total(Vec::new()), Some(0));
        assert_eq!(checked_total([1, 2, 3]), Some(6));
        assert_eq!(checked_total([u64::MAX, 0]), Some(u64::MAX));
        assert_eq!(checked_total([u64::MAX, 1]), None);
    }

    #[test]
    fn test_spendable_by_owner_only() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut out = UnspentOutput::new(hash(b"tx"), 0, alice(), 10, at);
        assert!(out.is_spendable_by(&alice()));
        assert!(!out.is_spendable_by(&WalletId::parse("bob").unwrap()));

        out.spent = true;
        assert!(!out.is_spendable_by(&alice()));
    }
}
