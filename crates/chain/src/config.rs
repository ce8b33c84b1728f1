//! Ledger configuration, persisted as `config.json`.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walletchain_consensus::MAX_DIFFICULTY;
use walletchain_storage::{LedgerStore, MemoryLedger, SledLedger, StoreError};

/// Difficulty used by freshly initialized ledgers.
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Errors loading or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

/// Where the ledger keeps its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Durable sled database at `path`. A relative path is taken
    /// relative to the directory holding the config file.
    Sled { path: PathBuf },
    /// Process memory; nothing survives the process.
    Memory,
}

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Leading hex zeros required of every block hash.
    pub difficulty: usize,
    pub backend: BackendConfig,
}

impl LedgerConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            backend,
        }
    }

    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_difficulty(self.difficulty)
    }

    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Open the configured store, resolving a relative sled path
    /// against `base`.
    pub fn open_store(&self, base: &Path) -> Result<Box<dyn LedgerStore>, StoreError> {
        Ok(match &self.backend {
            BackendConfig::Sled { path } => Box::new(SledLedger::open(base.join(path))?),
            BackendConfig::Memory => Box::new(MemoryLedger::new()),
        })
    }
}

pub(crate) fn validate_difficulty(difficulty: usize) -> Result<(), ValidationError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ValidationError::InvalidDifficulty {
            difficulty,
            max: MAX_DIFFICULTY,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::new(BackendConfig::Memory);
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_difficulty_limit() {
        let config = LedgerConfig::new(BackendConfig::Memory).with_difficulty(65);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidDifficulty { difficulty: 65, max: 64 })
        ));
        assert!(LedgerConfig::new(BackendConfig::Memory)
            .with_difficulty(64)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = LedgerConfig::new(BackendConfig::Sled {
            path: dir.path().join("ledger"),
        })
        .with_difficulty(3);

        config.save(&path).unwrap();
        assert_eq!(LedgerConfig::load(&path).unwrap(), config);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"type\": \"sled\""));
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, "{\"difficulty\": 2}").unwrap();
        assert!(matches!(LedgerConfig::load(&path), Err(ConfigError::Json(_))));

        fs::write(&path, "{\"difficulty\": 99, \"backend\": {\"type\": \"memory\"}}").unwrap();
        assert!(matches!(LedgerConfig::load(&path), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            LedgerConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_open_memory_store() {
        let store = LedgerConfig::new(BackendConfig::Memory)
            .open_store(Path::new("."))
            .unwrap();
        assert!(store.get_chain_tip().unwrap().is_none());
    }

    #[test]
    fn test_relative_sled_path_follows_base() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::new(BackendConfig::Sled {
            path: PathBuf::from("ledger"),
        });

        let base = dir.path().join("moved");
        let store = config.open_store(&base).unwrap();
        assert!(store.get_chain_tip().unwrap().is_none());
        assert!(base.join("ledger").exists());
        assert!(!Path::new("ledger").exists());
    }
}
