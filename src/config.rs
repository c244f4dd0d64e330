//! Archive Configuration
//!
//! Environment-variable based configuration with sensible defaults.
//! All paths derive from a single data directory.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub data_dir: PathBuf,
    pub witness_count: usize,
}

impl ArchiveConfig {
    /// Load from `ARCHIVE_DATA_DIR` and `ARCHIVE_WITNESS_COUNT`, falling
    /// back to `./archive-data` and three witnesses.
    pub fn load() -> Result<Self, ArchiveError> {
        let data_dir = env::var("ARCHIVE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("archive-data"));

        let witness_count = env::var("ARCHIVE_WITNESS_COUNT")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|e| ArchiveError::ConfigError(format!("Invalid witness count: {}", e)))?;

        Self::with_data_dir(data_dir, witness_count)
    }

    pub fn with_data_dir(data_dir: PathBuf, witness_count: usize) -> Result<Self, ArchiveError> {
        if witness_count == 0 {
            return Err(ArchiveError::ConfigError(
                "At least one witness log is required".to_string(),
            ));
        }
        Ok(Self {
            data_dir,
            witness_count,
        })
    }

    pub fn key_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn witness_dir(&self) -> PathBuf {
        self.data_dir.join("witness_logs")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn batch_store_path(&self) -> PathBuf {
        self.data_dir.join("batches.jsonl")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_data_dir() {
        let config = ArchiveConfig::with_data_dir(PathBuf::from("/tmp/arch"), 3).unwrap();
        assert_eq!(config.event_log_path(), PathBuf::from("/tmp/arch/events.jsonl"));
        assert_eq!(config.objects_dir(), PathBuf::from("/tmp/arch/objects"));
        assert_eq!(config.witness_dir(), PathBuf::from("/tmp/arch/witness_logs"));
    }

    #[test]
    fn test_zero_witnesses_rejected() {
        assert!(ArchiveConfig::with_data_dir(PathBuf::from("/tmp/arch"), 0).is_err());
    }
}
