//! Error taxonomy for ledger operations.

use thiserror::Error;
use walletchain_consensus::{ChainProblem, ConsensusError};
use walletchain_core::{
    CryptoError, OutputId, TransactionError, TransactionId, WalletId, WalletIdError,
};
use walletchain_storage::StoreError;

/// A request that is malformed or references bad inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid or spent input: {0}")]
    InvalidInput(OutputId),

    #[error("input {0} is listed more than once")]
    DuplicateInput(OutputId),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("input total overflows")]
    AmountOverflow,

    #[error("holdings of wallet {0} would overflow")]
    BalanceOverflow(WalletId),

    #[error("transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    #[error("field '{0}' contains the reserved separator '|'")]
    ReservedSeparator(&'static str),

    #[error("invalid wallet id: {0}")]
    InvalidWalletId(#[from] WalletIdError),

    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("difficulty {difficulty} exceeds the maximum of {max}")]
    InvalidDifficulty { difficulty: usize, max: usize },
}

impl From<TransactionError> for ValidationError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::ReservedSeparator(field) => ValidationError::ReservedSeparator(field),
        }
    }
}

impl From<CryptoError> for ValidationError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedKey(msg) => ValidationError::MalformedKey(msg),
            CryptoError::MalformedSignature(msg) => ValidationError::MalformedSignature(msg),
            CryptoError::InvalidPrivateKey => {
                ValidationError::MalformedKey("invalid private key".to_string())
            }
        }
    }
}

/// Errors returned by the admission and finalization engines and the
/// [`Ledger`](crate::Ledger) facade.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient funds (required {required}, available {available})")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("double spend: {}", describe_input(.input))]
    DoubleSpend { input: Option<OutputId> },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain validation found {} problem(s)", .0.len())]
    ChainLinkage(Vec<ChainProblem>),

    #[error("consensus error: {0}")]
    Consensus(ConsensusError),
}

fn describe_input(input: &Option<OutputId>) -> String {
    match input {
        Some(id) => format!("input {id} was spent by a concurrent transfer"),
        None => "lost a commit race to a concurrent transfer".to_string(),
    }
}

impl From<ConsensusError> for LedgerError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::InvalidDifficulty { difficulty, max } => {
                ValidationError::InvalidDifficulty { difficulty, max }.into()
            }
            other => LedgerError::Consensus(other),
        }
    }
}

impl From<WalletIdError> for LedgerError {
    fn from(err: WalletIdError) -> Self {
        ValidationError::from(err).into()
    }
}

impl From<TransactionError> for LedgerError {
    fn from(err: TransactionError) -> Self {
        ValidationError::from(err).into()
    }
}

impl From<CryptoError> for LedgerError {
    fn from(err: CryptoError) -> Self {
        ValidationError::from(err).into()
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
