//! Ledger properties, checked against every store backend.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Barrier;
use std::thread;
use walletchain_chain::{FinalizationOutcome, Ledger, LedgerError, TransferRequest, ValidationError};
use walletchain_core::{
    merkle_root, output_id, Keypair, ManualClock, OutputId, SystemClock, TransactionRecord, WalletId,
};
use walletchain_storage::{LedgerStore, MemoryLedger, SledLedger};

fn clock() -> ManualClock {
    ManualClock::with_step(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Duration::milliseconds(1),
    )
}

struct Fixture<'a> {
    ledger: Ledger<'a>,
    alice: Keypair,
}

impl<'a> Fixture<'a> {
    fn new(store: &'a dyn LedgerStore, clock: &'a ManualClock, difficulty: usize) -> Self {
        let ledger = Ledger::new(store, clock, difficulty).unwrap();
        let alice = Keypair::generate();
        ledger
            .register_wallet(&alice.public_key.to_hex(), Some("alice"))
            .unwrap();
        Self { ledger, alice }
    }

    /// Fund alice and return the new output id.
    fn fund_alice(&self, amount: u64) -> OutputId {
        let tx = self.ledger.fund("alice", amount, None).unwrap();
        output_id(&tx, 0)
    }

    fn transfer(&self, receiver: &str, amount: u64, inputs: Vec<OutputId>) -> TransferRequest {
        TransferRequest::signed(
            "alice",
            receiver,
            amount,
            "",
            "2024-01-01T00:00:00Z",
            inputs,
            &self.alice,
        )
        .unwrap()
    }

    fn snapshot(&self) -> String {
        let wallets: Vec<_> = ["alice", "bob", "carol"]
            .iter()
            .map(|w| {
                let id = WalletId::parse(w).unwrap();
                (id.clone(), self.ledger.store().unspent_outputs(&id).unwrap())
            })
            .collect();
        let pending = self.ledger.store().list_pending_ids().unwrap();
        format!("{wallets:?}{pending:?}")
    }
}

fn conservation(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    let a = f.fund_alice(70);
    let b = f.fund_alice(45);

    let id = f.ledger.admit(&f.transfer("bob", 99, vec![a, b])).unwrap();
    let tx = f.ledger.transaction(&id).unwrap().transaction().clone();
    assert_eq!(tx.output_total(), Some(115));
    assert_eq!(tx.inputs, vec![a, b]);

    let created: u64 = (0..tx.outputs.len() as u32)
        .map(|i| f.ledger.output(&output_id(&id, i)).unwrap().amount)
        .sum();
    assert_eq!(created, 115);
    assert_eq!(f.ledger.balance("alice").unwrap() + f.ledger.balance("bob").unwrap(), 115);
}

fn at_most_once_spend(store: &dyn LedgerStore) {
    const CONTENDERS: usize = 8;
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    let contested = f.fund_alice(100);

    let requests: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let receiver = if i % 2 == 0 { "bob" } else { "carol" };
            f.transfer(receiver, 10 + i as u64, vec![contested])
        })
        .collect();

    let barrier = Barrier::new(CONTENDERS);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = requests
            .iter()
            .map(|request| {
                let ledger = &f.ledger;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    ledger.admit(request)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one spend of the contested output");
    for result in &results {
        match result {
            Ok(_) => {}
            Err(LedgerError::DoubleSpend { input }) => {
                assert_eq!(*input, Some(contested))
            }
            Err(LedgerError::Validation(ValidationError::InvalidInput(id))) => {
                assert_eq!(*id, contested)
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // the one winner plus the funding transaction, no orphan outputs
    assert_eq!(f.ledger.pending().unwrap().len(), 2);
    let total = f.ledger.balance("alice").unwrap()
        + f.ledger.balance("bob").unwrap()
        + f.ledger.balance("carol").unwrap();
    assert_eq!(total, 100);
}

fn merkle_round_trip(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    f.fund_alice(1);
    f.fund_alice(2);
    f.fund_alice(3);

    let block = match f.ledger.finalize().unwrap() {
        FinalizationOutcome::Sealed(block) => block,
        other => panic!("expected a block, got {other:?}"),
    };
    let stored = f.ledger.block(block.index()).unwrap();
    assert_eq!(stored, block);
    assert_eq!(stored.transaction_ids.len(), 3);
    assert_eq!(merkle_root(&stored.transaction_ids), stored.header.merkle_root);
}

fn chain_linkage(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 1);
    for amount in 1..=4 {
        f.fund_alice(amount);
        f.ledger.finalize().unwrap();
    }

    let mut previous = None;
    for index in 1..=4 {
        let block = f.ledger.block(index).unwrap();
        assert_eq!(block.previous_hash(), previous);
        assert!(block.verify_hash());
        previous = Some(block.hash);
    }
    assert_eq!(f.ledger.validate_chain().unwrap().blocks_checked, 4);
}

fn simple_transfer(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    let input = f.fund_alice(100);
    f.ledger.finalize().unwrap();

    let id = f.ledger.admit(&f.transfer("bob", 100, vec![input])).unwrap();

    assert_eq!(f.ledger.balance("alice").unwrap(), 0);
    assert_eq!(f.ledger.balance("bob").unwrap(), 100);
    assert!(f.ledger.output(&input).unwrap().spent);

    let pending = f.ledger.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].outputs.len(), 1, "no change output");
}

fn insufficient_funds(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    let input = f.fund_alice(50);

    let err = f.ledger.admit(&f.transfer("bob", 100, vec![input])).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            required: 100,
            available: 50
        }
    ));
    assert_eq!(f.ledger.balance("alice").unwrap(), 50);
    assert!(!f.ledger.output(&input).unwrap().spent);
}

fn replay_of_spent_input(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    let input = f.fund_alice(100);
    let request = f.transfer("bob", 100, vec![input]);
    f.ledger.admit(&request).unwrap();

    let before = f.snapshot();
    let err = f.ledger.admit(&request).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::InvalidInput(id)) if id == input
    ));
    let err = f.ledger.admit(&f.transfer("carol", 10, vec![input])).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ValidationError::InvalidInput(_))));
    assert_eq!(f.snapshot(), before);
}

fn mining(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    assert_eq!(f.ledger.finalize().unwrap(), FinalizationOutcome::NothingToFinalize);

    f.fund_alice(1);
    let block = f.ledger.finalize().unwrap().block().cloned().unwrap();
    assert_eq!(block.header.nonce, 0);

    let clock = SystemClock;
    let hard = Ledger::new(store, &clock, 2).unwrap();
    hard.fund("alice", 1, None).unwrap();
    let block = hard.finalize().unwrap().block().cloned().unwrap();
    assert!(block.hash.to_hex().starts_with("00"));
    assert_eq!(block.index(), 2);
}

fn admissions_after_snapshot_stay_pending(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    f.fund_alice(1);
    let snapshot = store.list_pending_ids().unwrap();

    // admitted between the snapshot and the commit
    let late = f.ledger.fund("alice", 2, None).unwrap();
    let block = walletchain_consensus::ProofOfWork::new(0)
        .unwrap()
        .mine(1, None, snapshot.clone(), &clock)
        .unwrap();
    store.finalize(&snapshot, &block).unwrap();

    assert_eq!(store.list_pending_ids().unwrap(), vec![late]);
    match f.ledger.transaction(&late).unwrap() {
        TransactionRecord::Pending(_) => {}
        other => panic!("late admission was swept into the block: {other:?}"),
    }
    let next = f.ledger.finalize().unwrap().block().cloned().unwrap();
    assert_eq!(next.transaction_ids, vec![late]);
}

fn blocks_keep_the_difficulty_they_were_mined_at(store: &dyn LedgerStore) {
    let clock = clock();
    let f = Fixture::new(store, &clock, 0);
    f.fund_alice(1);
    let easy = f.ledger.finalize().unwrap();
    assert_eq!(easy.block().map(|b| b.difficulty), Some(0));

    // a later, stricter ledger over the same store accepts the earlier block
    let strict = Ledger::new(store, &clock, 2).unwrap();
    strict.fund("alice", 2, None).unwrap();
    let hard = strict.finalize().unwrap();
    let hard = hard.block().unwrap();
    assert_eq!(hard.difficulty, 2);
    assert!(hard.hash.to_hex().starts_with("00"));

    assert_eq!(strict.validate_chain().unwrap().blocks_checked, 2);
    assert_eq!(f.ledger.validate_chain().unwrap().blocks_checked, 2);
    assert_eq!(strict.block(1).unwrap().difficulty, 0);
}

macro_rules! property_suite {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn conservation() {
                super::conservation(&$make);
            }

            #[test]
            fn at_most_once_spend() {
                super::at_most_once_spend(&$make);
            }

            #[test]
            fn merkle_round_trip() {
                super::merkle_round_trip(&$make);
            }

            #[test]
            fn chain_linkage() {
                super::chain_linkage(&$make);
            }

            #[test]
            fn simple_transfer() {
                super::simple_transfer(&$make);
            }

            #[test]
            fn insufficient_funds() {
                super::insufficient_funds(&$make);
            }

            #[test]
            fn replay_of_spent_input() {
                super::replay_of_spent_input(&$make);
            }

            #[test]
            fn mining() {
                super::mining(&$make);
            }

            #[test]
            fn admissions_after_snapshot_stay_pending() {
                super::admissions_after_snapshot_stay_pending(&$make);
            }

            #[test]
            fn blocks_keep_the_difficulty_they_were_mined_at() {
                super::blocks_keep_the_difficulty_they_were_mined_at(&$make);
            }
        }
    };
}

property_suite!(memory, MemoryLedger::new());
property_suite!(sled, SledLedger::open_temporary().unwrap());
