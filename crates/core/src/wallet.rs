//! Wallet identities.

use crate::crypto::PublicKey;
use crate::hash::hash;
use crate::transaction::FIELD_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Sender name used by system-funding transactions.
pub const SYSTEM_SENDER: &str = "system";

/// Errors produced when parsing a wallet id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletIdError {
    #[error("wallet id is empty")]
    Empty,
    #[error("wallet id contains the reserved separator '|'")]
    ReservedSeparator,
    #[error("wallet id '{0}' is reserved")]
    Reserved(String),
}

/// Stable identifier of a registered wallet.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    /// Parse a caller-supplied wallet id.
    pub fn parse(s: &str) -> Result<Self, WalletIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WalletIdError::Empty);
        }
        if s.contains(FIELD_SEPARATOR) {
            return Err(WalletIdError::ReservedSeparator);
        }
        if s == SYSTEM_SENDER {
            return Err(WalletIdError::Reserved(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Derive the default id for a public key: `0x` plus the first 20
    /// bytes of the Blake3 hash of the key, hex encoded.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = hash(&key.as_bytes());
        Self(format!("0x{}", hex::encode(&digest.0[..20])))
    }

    /// The pseudo-wallet that sends system-funding transactions.
    pub fn system() -> Self {
        Self(SYSTEM_SENDER.to_string())
    }

    /// Whether this is the system pseudo-wallet.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_SENDER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletId({})", self.0)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WalletId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A registered wallet. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub public_key: PublicKey,
}

impl Wallet {
    /// Build a wallet, deriving the id from the key when none is supplied.
    pub fn new(public_key: PublicKey, id: Option<WalletId>) -> Self {
        let id = id.unwrap_or_else(|| WalletId::from_public_key(&public_key));
        Self { id, public_key }
    }
}
