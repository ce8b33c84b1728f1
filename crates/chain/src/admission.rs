//! Transfer admission.
//!
//! A transfer is checked in a fixed order and fails at the first
//! violation: sender key, signature, inputs, funds. Only then is it
//! committed, in one atomic store call that re-checks every input, so
//! two admissions racing for the same output cannot both succeed.

use crate::error::{LedgerError, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use walletchain_core::{
    canonical_message, transaction_id, verify, Clock, Keypair, OutputId, PublicKey, Signature,
    Transaction, TransactionId, TxOutput, UnspentOutput, WalletId,
};
use walletchain_storage::{Conflict, LedgerStore, StoreError};

/// Note attached to system funding when none is given.
pub const DEFAULT_FUNDING_NOTE: &str = "admin_funding";

/// A signed request to move value between wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    #[serde(default)]
    pub note: String,
    /// Client timestamp, covered by the signature verbatim.
    pub timestamp: String,
    /// Optional; must match the registered key when present.
    #[serde(default)]
    pub sender_public_key: Option<String>,
    /// Hex-encoded ed25519 signature over [`TransferRequest::signing_message`].
    pub signature: String,
    pub inputs: Vec<OutputId>,
}

impl TransferRequest {
    /// The canonical `sender|receiver|amount|timestamp|note` message.
    pub fn signing_message(&self) -> std::result::Result<String, ValidationError> {
        Ok(canonical_message(
            &self.sender,
            &self.receiver,
            self.amount,
            &self.timestamp,
            &self.note,
        )?)
    }

    /// Build a request and sign it with `keypair`.
    pub fn signed(
        sender: &str,
        receiver: &str,
        amount: u64,
        note: &str,
        timestamp: &str,
        inputs: Vec<OutputId>,
        keypair: &Keypair,
    ) -> std::result::Result<Self, ValidationError> {
        let mut request = Self {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            note: note.to_string(),
            timestamp: timestamp.to_string(),
            sender_public_key: Some(keypair.public_key.to_hex()),
            signature: String::new(),
            inputs,
        };
        let message = request.signing_message()?;
        request.signature = keypair.sign(message.as_bytes()).to_hex();
        Ok(request)
    }
}

/// Validates transfer requests and commits them to the store.
pub struct AdmissionEngine<'a> {
    store: &'a dyn LedgerStore,
    clock: &'a dyn Clock,
}

impl<'a> AdmissionEngine<'a> {
    pub fn new(store: &'a dyn LedgerStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Admit a signed transfer, returning the new pending transaction id.
    pub fn admit(&self, request: &TransferRequest) -> Result<TransactionId> {
        let result = self.try_admit(request);
        if let Err(err) = &result {
            debug!(sender = %request.sender, error = %err, "transfer rejected");
        }
        result
    }

    fn try_admit(&self, request: &TransferRequest) -> Result<TransactionId> {
        if request.amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let sender = WalletId::parse(&request.sender)?;
        let receiver = WalletId::parse(&request.receiver)?;
        let message = request.signing_message()?;

        // 1. sender key
        let wallet = self
            .store
            .get_wallet(&sender)?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet {sender}")))?;
        if let Some(supplied) = &request.sender_public_key {
            if PublicKey::from_hex(supplied)? != wallet.public_key {
                return Err(LedgerError::Authentication(format!(
                    "supplied public key does not match the key registered for {sender}"
                )));
            }
        }

        // 2. signature
        if !verify(&wallet.public_key.to_hex(), message.as_bytes(), &request.signature)? {
            return Err(LedgerError::Authentication("invalid signature".to_string()));
        }
        let signature = Signature::from_hex(&request.signature)?;

        // 3. inputs
        let mut seen = HashSet::with_capacity(request.inputs.len());
        let mut total_in: u64 = 0;
        for id in &request.inputs {
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicateInput(*id).into());
            }
            let output = match self.store.get_output(id)? {
                Some(output) if output.is_spendable_by(&sender) => output,
                _ => return Err(ValidationError::InvalidInput(*id).into()),
            };
            total_in = total_in
                .checked_add(output.amount)
                .ok_or(ValidationError::AmountOverflow)?;
        }

        // 4. funds
        if total_in < request.amount {
            return Err(LedgerError::InsufficientFunds {
                required: request.amount,
                available: total_in,
            });
        }

        // 5. outputs: receiver first, change back to the sender
        let change = total_in - request.amount;
        let mut outputs = vec![TxOutput {
            recipient: receiver.clone(),
            amount: request.amount,
        }];
        if change > 0 {
            outputs.push(TxOutput {
                recipient: sender.clone(),
                amount: change,
            });
        }

        let admitted_at = self.clock.now();
        let id = transaction_id(&sender, &receiver, request.amount, &admitted_at, &request.note);
        let transaction = Transaction {
            id,
            sender,
            receiver,
            amount: request.amount,
            note: request.note.clone(),
            timestamp: admitted_at,
            signed_timestamp: request.timestamp.clone(),
            sender_public_key: Some(wallet.public_key),
            signature: Some(signature),
            inputs: request.inputs.clone(),
            outputs,
        };

        // 6. commit
        self.commit(&request.inputs, &transaction)?;
        info!(
            tx = %id,
            sender = %transaction.sender,
            receiver = %transaction.receiver,
            amount = transaction.amount,
            change,
            "transfer admitted"
        );
        Ok(id)
    }

    /// Mint `amount` to a registered wallet as a system-funding
    /// transaction. No inputs, no signature.
    pub fn fund(&self, receiver: &str, amount: u64, note: Option<&str>) -> Result<TransactionId> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let receiver = WalletId::parse(receiver)?;
        let note = note.unwrap_or(DEFAULT_FUNDING_NOTE);
        let sender = WalletId::system();
        if self.store.get_wallet(&receiver)?.is_none() {
            return Err(LedgerError::NotFound(format!("wallet {receiver}")));
        }
        if self.store.balance(&receiver)?.checked_add(amount).is_none() {
            return Err(ValidationError::BalanceOverflow(receiver).into());
        }

        let admitted_at = self.clock.now();
        let signed_timestamp = walletchain_core::format_timestamp(&admitted_at);
        canonical_message(sender.as_str(), receiver.as_str(), amount, &signed_timestamp, note)?;

        let id = transaction_id(&sender, &receiver, amount, &admitted_at, note);
        let transaction = Transaction {
            id,
            sender,
            receiver: receiver.clone(),
            amount,
            note: note.to_string(),
            timestamp: admitted_at,
            signed_timestamp,
            sender_public_key: None,
            signature: None,
            inputs: Vec::new(),
            outputs: vec![TxOutput {
                recipient: receiver.clone(),
                amount,
            }],
        };

        self.commit(&[], &transaction)?;
        info!(tx = %id, receiver = %receiver, amount, "system funding admitted");
        Ok(id)
    }

    fn commit(&self, spend_ids: &[OutputId], transaction: &Transaction) -> Result<()> {
        let outputs: Vec<UnspentOutput> = transaction
            .outputs
            .iter()
            .enumerate()
            .map(|(index, out)| {
                UnspentOutput::new(
                    transaction.id,
                    index as u32,
                    out.recipient.clone(),
                    out.amount,
                    transaction.timestamp,
                )
            })
            .collect();

        match self.store.commit_transfer(spend_ids, &outputs, transaction) {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(conflict)) => Err(refused(transaction, conflict)),
            Err(err) => Err(err.into()),
        }
    }
}

/// Map a refused commit onto the ledger taxonomy. Only input conflicts
/// are double spends.
fn refused(transaction: &Transaction, conflict: Conflict) -> LedgerError {
    if let Some(input) = conflict.contested_input() {
        warn!(tx = %transaction.id, %conflict, "transfer lost a commit race");
        return LedgerError::DoubleSpend { input: Some(input) };
    }
    match conflict {
        Conflict::DuplicateTransaction(_) | Conflict::DuplicateOutput(_) => {
            ValidationError::DuplicateTransaction(transaction.id).into()
        }
        Conflict::BalanceOverflow(wallet) => ValidationError::BalanceOverflow(wallet).into(),
        other => StoreError::Conflict(other).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use walletchain_core::{ManualClock, Wallet};
    use walletchain_storage::MemoryLedger;

    fn clock() -> ManualClock {
        ManualClock::with_step(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Duration::milliseconds(1),
        )
    }

    fn register(store: &MemoryLedger, name: &str) -> Keypair {
        let keypair = Keypair::generate();
        let wallet = Wallet::new(keypair.public_key.clone(), Some(WalletId::parse(name).unwrap()));
        store.register_wallet(&wallet).unwrap();
        keypair
    }

    fn funded(engine: &AdmissionEngine, store: &MemoryLedger, wallet: &str, amount: u64) -> OutputId {
        engine.fund(wallet, amount, None).unwrap();
        let id = WalletId::parse(wallet).unwrap();
        store.unspent_outputs(&id).unwrap().last().unwrap().id
    }

    #[test]
    fn test_request_signature_covers_canonical_message() {
        let keypair = Keypair::generate();
        let request =
            TransferRequest::signed("alice", "bob", 5, "hi", "2024-01-01T00:00:00Z", vec![], &keypair)
                .unwrap();
        assert_eq!(request.signing_message().unwrap(), "alice|bob|5|2024-01-01T00:00:00Z|hi");
        let sig = Signature::from_hex(&request.signature).unwrap();
        assert!(keypair.public_key.verify(b"alice|bob|5|2024-01-01T00:00:00Z|hi", &sig));
    }

    #[test]
    fn test_admit_with_change() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");
        let input = funded(&engine, &store, "alice", 100);

        let request =
            TransferRequest::signed("alice", "bob", 30, "", "t0", vec![input], &alice).unwrap();
        let id = engine.admit(&request).unwrap();

        let alice_id = WalletId::parse("alice").unwrap();
        let bob_id = WalletId::parse("bob").unwrap();
        assert_eq!(store.balance(&alice_id).unwrap(), 70);
        assert_eq!(store.balance(&bob_id).unwrap(), 30);

        let record = store.get_transaction(&id).unwrap().unwrap();
        let tx = record.transaction();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.output_total(), Some(100));
        assert_eq!(tx.signed_timestamp, "t0");
        assert_eq!(store.get_output(&walletchain_core::output_id(&id, 0)).unwrap().unwrap().owner, bob_id);
        assert_eq!(store.get_output(&walletchain_core::output_id(&id, 1)).unwrap().unwrap().owner, alice_id);
    }

    #[test]
    fn test_unregistered_sender_is_not_found() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let request =
            TransferRequest::signed("ghost", "bob", 1, "", "t", vec![], &Keypair::generate()).unwrap();
        assert!(matches!(engine.admit(&request), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_bad_signature_is_authentication_error() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");
        let input = funded(&engine, &store, "alice", 10);

        let mut request =
            TransferRequest::signed("alice", "bob", 10, "", "t", vec![input], &alice).unwrap();
        request.amount = 9;
        assert!(matches!(engine.admit(&request), Err(LedgerError::Authentication(_))));

        // signed by someone else, no key supplied
        let mut request =
            TransferRequest::signed("alice", "bob", 10, "", "t", vec![input], &Keypair::generate())
                .unwrap();
        request.sender_public_key = None;
        assert!(matches!(engine.admit(&request), Err(LedgerError::Authentication(_))));
    }

    #[test]
    fn test_supplied_key_must_match_registration() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        register(&store, "alice");
        let mallory = Keypair::generate();
        let request = TransferRequest::signed("alice", "bob", 1, "", "t", vec![], &mallory).unwrap();
        assert!(matches!(engine.admit(&request), Err(LedgerError::Authentication(_))));
    }

    #[test]
    fn test_malformed_encodings_are_validation_errors() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");

        let mut request = TransferRequest::signed("alice", "bob", 1, "", "t", vec![], &alice).unwrap();
        request.signature = "zz".into();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::MalformedSignature(_)))
        ));

        request.sender_public_key = Some("abcd".into());
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::MalformedKey(_)))
        ));
    }

    #[test]
    fn test_request_shape_checks() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");

        let request = TransferRequest::signed("alice", "bob", 0, "", "t", vec![], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::ZeroAmount))
        ));

        assert!(TransferRequest::signed("alice", "bob", 1, "a|b", "t", vec![], &alice).is_err());
        let mut request = TransferRequest::signed("alice", "bob", 1, "", "t", vec![], &alice).unwrap();
        request.note = "a|b".into();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::ReservedSeparator("note")))
        ));

        let request = TransferRequest::signed("alice", "system", 1, "", "t", vec![], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::InvalidWalletId(_)))
        ));
    }

    #[test]
    fn test_input_checks() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");
        register(&store, "bob");
        let mine = funded(&engine, &store, "alice", 10);
        let bobs = funded(&engine, &store, "bob", 10);

        let request =
            TransferRequest::signed("alice", "bob", 5, "", "t", vec![mine, mine], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::DuplicateInput(id))) if id == mine
        ));

        let request =
            TransferRequest::signed("alice", "bob", 5, "", "t", vec![bobs], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::InvalidInput(id))) if id == bobs
        ));

        let ghost = walletchain_core::hash(b"ghost");
        let request =
            TransferRequest::signed("alice", "bob", 5, "", "t", vec![ghost], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::InvalidInput(id))) if id == ghost
        ));

        let request = TransferRequest::signed("alice", "bob", 11, "", "t", vec![mine], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::InsufficientFunds {
                required: 11,
                available: 10
            })
        ));
    }

    #[test]
    fn test_fund_refuses_overflowing_holdings() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        register(&store, "alice");
        let alice = WalletId::parse("alice").unwrap();

        engine.fund("alice", u64::MAX, None).unwrap();
        assert!(matches!(
            engine.fund("alice", 1, None),
            Err(LedgerError::Validation(ValidationError::BalanceOverflow(ref w))) if *w == alice
        ));
        assert_eq!(store.balance(&alice).unwrap(), u64::MAX);
        assert_eq!(store.list_pending_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_refuses_overflowing_receiver() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        let alice = register(&store, "alice");
        register(&store, "bob");
        let input = funded(&engine, &store, "alice", 2);
        engine.fund("bob", u64::MAX, None).unwrap();

        let request =
            TransferRequest::signed("alice", "bob", 1, "", "t", vec![input], &alice).unwrap();
        assert!(matches!(
            engine.admit(&request),
            Err(LedgerError::Validation(ValidationError::BalanceOverflow(_)))
        ));
        assert!(!store.get_output(&input).unwrap().unwrap().spent);
    }

    #[test]
    fn test_id_collision_is_not_a_double_spend() {
        let store = MemoryLedger::new();
        // a clock that never moves gives identical fundings the same id
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let engine = AdmissionEngine::new(&store, &clock);
        register(&store, "alice");

        let first = engine.fund("alice", 5, None).unwrap();
        assert!(matches!(
            engine.fund("alice", 5, None),
            Err(LedgerError::Validation(ValidationError::DuplicateTransaction(id))) if id == first
        ));
        assert_eq!(store.balance(&WalletId::parse("alice").unwrap()).unwrap(), 5);

        // a different amount at the same instant is a different transaction
        engine.fund("alice", 6, None).unwrap();
    }

    #[test]
    fn test_fund() {
        let store = MemoryLedger::new();
        let clock = clock();
        let engine = AdmissionEngine::new(&store, &clock);
        register(&store, "alice");

        let id = engine.fund("alice", 25, None).unwrap();
        let tx = store.get_transaction(&id).unwrap().unwrap().transaction().clone();
        assert!(tx.is_system_funding());
        assert_eq!(tx.note, DEFAULT_FUNDING_NOTE);
        assert!(tx.inputs.is_empty());
        assert_eq!(store.balance(&WalletId::parse("alice").unwrap()).unwrap(), 25);

        assert!(matches!(engine.fund("nobody", 1, None), Err(LedgerError::NotFound(_))));
        assert!(matches!(
            engine.fund("alice", 0, None),
            Err(LedgerError::Validation(ValidationError::ZeroAmount))
        ));
        assert!(matches!(
            engine.fund("alice", 1, Some("x|y")),
            Err(LedgerError::Validation(ValidationError::ReservedSeparator("note")))
        ));
    }
}
