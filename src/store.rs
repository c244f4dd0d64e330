//! Content-Addressed Object Store
//!
//! Raw document bytes keyed by their hex SHA-256 digest, one file per
//! blob. The archive owns writes; the auditor only checks existence.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::crypto::digest::sha256_hex;
use crate::error::ArchiveError;

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        fs::create_dir_all(root).map_err(|e| {
            ArchiveError::StorageError(format!("Failed to create object store: {}", e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// Store raw bytes under their content hash, returning the hash.
    pub fn put(&self, content: &[u8]) -> Result<String, ArchiveError> {
        let hash = sha256_hex(content);
        fs::write(self.blob_path(&hash), content)
            .map_err(|e| ArchiveError::StorageError(format!("Failed to write blob: {}", e)))?;
        debug!("Stored blob {}", hash);
        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| ArchiveError::StorageError(format!("Failed to read blob: {}", e)))
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    pub fn remove(&self, hash: &str) -> Result<(), ArchiveError> {
        let path = self.blob_path(hash);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ArchiveError::StorageError(format!("Failed to remove blob: {}", e)))?;
            debug!("Removed blob {}", hash);
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
