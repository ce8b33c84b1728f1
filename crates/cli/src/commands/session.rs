//! Shared plumbing: data directory, config, store and key files.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walletchain_chain::{Ledger, LedgerConfig};
use walletchain_core::{Keypair, SystemClock};
use walletchain_storage::LedgerStore;

pub const CONFIG_FILE: &str = "config.json";
pub const KEYS_DIR: &str = "keys";
pub const LEDGER_DIR: &str = "ledger";

#[derive(Args, Clone)]
pub struct DataDirArgs {
    /// Directory holding the ledger data
    #[arg(short, long, default_value = "./data")]
    pub data_dir: PathBuf,
}

/// An opened ledger: config, store and clock.
pub struct Session {
    pub config: LedgerConfig,
    store: Box<dyn LedgerStore>,
    clock: SystemClock,
}

impl Session {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = LedgerConfig::load(data_dir.join(CONFIG_FILE))
            .context("Failed to read config.json. Did you run 'walletchain init'?")?;
        let store = config
            .open_store(data_dir)
            .context("Failed to open the ledger store")?;
        debug!(data_dir = %data_dir.display(), difficulty = config.difficulty, "opened ledger");
        Ok(Self {
            config,
            store,
            clock: SystemClock,
        })
    }

    pub fn ledger(&self) -> Result<Ledger<'_>> {
        self.ledger_with_difficulty(self.config.difficulty)
    }

    pub fn ledger_with_difficulty(&self, difficulty: usize) -> Result<Ledger<'_>> {
        Ok(Ledger::new(self.store.as_ref(), &self.clock, difficulty)?)
    }
}

/// A saved wallet key, `keys/<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    pub wallet_id: String,
    pub public_key: String,
    pub private_key: String,
}

impl KeyFile {
    pub fn new(wallet_id: &str, keypair: &Keypair) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            public_key: keypair.public_key.to_hex(),
            private_key: hex::encode(keypair.private_key()),
        }
    }

    pub fn keypair(&self) -> Result<Keypair> {
        let keypair = Keypair::from_private_hex(&self.private_key)
            .context("Invalid private key in key file")?;
        if keypair.public_key.to_hex() != self.public_key {
            bail!("Key file is inconsistent: public key does not match private key");
        }
        Ok(keypair)
    }
}

pub fn key_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(KEYS_DIR).join(format!("{}.json", name))
}

pub fn save_key(data_dir: &Path, name: &str, key: &KeyFile) -> Result<PathBuf> {
    let path = key_path(data_dir, name);
    if path.exists() {
        bail!("Key file already exists: {}", path.display());
    }
    fs::create_dir_all(data_dir.join(KEYS_DIR))?;
    fs::write(&path, serde_json::to_string_pretty(key)?)?;
    Ok(path)
}

pub fn load_key(data_dir: &Path, name: &str) -> Result<KeyFile> {
    let path = key_path(data_dir, name);
    if !path.exists() {
        bail!(
            "Key file not found: {}. Use 'walletchain wallet new' to create one.",
            path.display()
        );
    }
    let contents = fs::read_to_string(&path)?;
    serde_json::from_str(&contents).with_context(|| format!("Malformed key file {}", path.display()))
}

/// Saved key files as `(name, key)`, sorted by name.
pub fn list_keys(data_dir: &Path) -> Result<Vec<(String, KeyFile)>> {
    let keys_dir = data_dir.join(KEYS_DIR);
    if !keys_dir.exists() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in fs::read_dir(&keys_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let contents = fs::read_to_string(&path)?;
        if let Ok(key) = serde_json::from_str::<KeyFile>(&contents) {
            keys.push((name, key));
        }
    }
    keys.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = Keypair::generate();
        let key = KeyFile::new("alice", &keypair);

        save_key(dir.path(), "alice", &key).unwrap();
        assert!(save_key(dir.path(), "alice", &key).is_err());

        let loaded = load_key(dir.path(), "alice").unwrap();
        assert_eq!(loaded, key);
        assert_eq!(loaded.keypair().unwrap().public_key, keypair.public_key);

        let listed = list_keys(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "alice");
    }

    #[test]
    fn test_inconsistent_key_file_rejected() {
        let mut key = KeyFile::new("alice", &Keypair::generate());
        key.public_key = Keypair::generate().public_key.to_hex();
        assert!(key.keypair().is_err());
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::open(dir.path()).err().unwrap();
        assert!(format!("{err:#}").contains("walletchain init"));
    }
}
