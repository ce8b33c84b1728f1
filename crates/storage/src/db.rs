//! sled database wrapper with the versioned record codec.

use crate::store::Conflict;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use thiserror::Error;
use walletchain_core::{OutputId, TransactionId, WalletId};

/// Version written into every stored record.
pub const RECORD_VERSION: u16 = 1;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Unsupported record version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Conflict: {0}")]
    Conflict(Conflict),
}

impl StoreError {
    /// The conflict, if this error is one.
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            StoreError::Conflict(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Conflict> for StoreError {
    fn from(conflict: Conflict) -> Self {
        StoreError::Conflict(conflict)
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Serialize)]
struct VersionedRef<'a, T> {
    version: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct Versioned<T> {
    version: u16,
    body: T,
}

/// Encode a record inside the version envelope.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&VersionedRef {
        version: RECORD_VERSION,
        body: value,
    })?)
}

/// Decode a record, rejecting unknown versions and malformed bodies.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // The envelope starts with the version, so it can be read on its own.
    let version: u16 = bincode::deserialize(bytes)?;
    if version != RECORD_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            expected: RECORD_VERSION,
        });
    }
    let record: Versioned<T> = bincode::deserialize(bytes)?;
    Ok(record.body)
}

/// Wrapper around sled database with serialization helpers.
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Retrieve and decode a record.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Keys under `prefix`, with the prefix stripped.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (key, _) = entry?;
            keys.push(key[prefix.len()..].to_vec());
        }
        Ok(keys)
    }

    /// Get the underlying sled database (for transactions).
    pub fn inner(&self) -> &Db {
        &self.db
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    pub const WALLET_PREFIX: &'static [u8] = b"wallet:";

    /// Format: "wallet:" + wallet id
    pub fn wallet_key(id: &WalletId) -> Vec<u8> {
        let mut key = Self::WALLET_PREFIX.to_vec();
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }

    /// Format: "output:" + output id bytes
    pub fn output_key(id: &OutputId) -> Vec<u8> {
        let mut key = b"output:".to_vec();
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Unspent output ids owned by a wallet.
    /// Format: "owner:" + wallet id
    pub fn owner_key(id: &WalletId) -> Vec<u8> {
        let mut key = b"owner:".to_vec();
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }

    /// Format: "tx:pending:" + transaction id bytes
    pub fn pending_tx_key(id: &TransactionId) -> Vec<u8> {
        let mut key = b"tx:pending:".to_vec();
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Format: "tx:final:" + transaction id bytes
    pub fn finalized_tx_key(id: &TransactionId) -> Vec<u8> {
        let mut key = b"tx:final:".to_vec();
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Format: "block:index:{index}"
    pub fn block_index_key(index: u64) -> Vec<u8> {
        format!("block:index:{}", index).into_bytes()
    }

    /// Ordered list of pending transaction ids.
    pub const PENDING_INDEX_KEY: &'static [u8] = b"pending:index";

    /// Current chain tip.
    pub const CHAIN_TIP_KEY: &'static [u8] = b"chain:tip";
}
