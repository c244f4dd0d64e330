//! Witness Logs and Publication
//!
//! Each witness log is an independent append-only JSONL file of signed
//! batch headers, used as public evidence of a batch's existence. The
//! publisher only ever appends; records are read back by the verifier
//! alone. A record's presence in any single log is treated as sufficient
//! evidence (no quorum is required by the current design).

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::builder::{Batch, BatchHeader};
use crate::error::ArchiveError;

/// One published batch header as it appears in a witness log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub sequence: u64,
    pub header: BatchHeader,
    pub header_hash: String,
    pub signature: String,
}

impl WitnessRecord {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            sequence: batch.header.sequence,
            header: batch.header.clone(),
            header_hash: batch.header_hash.clone(),
            signature: batch.signature.clone(),
        }
    }
}

/// A single append-only witness log file.
#[derive(Debug, Clone)]
pub struct WitnessLog {
    name: String,
    path: PathBuf,
}

impl WitnessLog {
    pub fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&self, record: &WitnessRecord) -> Result<(), ArchiveError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::WitnessError(format!(
                    "Failed to create witness directory for {}: {}",
                    self.name, e
                ))
            })?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ArchiveError::WitnessError(format!("Failed to open witness {}: {}", self.name, e))
            })?;
        writeln!(file, "{}", json).map_err(|e| {
            ArchiveError::WitnessError(format!("Failed to write witness {}: {}", self.name, e))
        })?;
        file.flush().map_err(|e| {
            ArchiveError::WitnessError(format!("Failed to flush witness {}: {}", self.name, e))
        })?;

        debug!("Witness {} recorded batch {}", self.name, record.sequence);
        Ok(())
    }

    /// All records in append order. Used by the verifier only.
    pub fn records(&self) -> Result<Vec<WitnessRecord>, ArchiveError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path).map_err(|e| {
            ArchiveError::WitnessError(format!("Failed to open witness {}: {}", self.name, e))
        })?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|e| {
                ArchiveError::WitnessError(format!("Failed to read witness {}: {}", self.name, e))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }
}

/// Replicates signed batch headers to every configured witness log.
pub struct WitnessPublisher {
    logs: Vec<WitnessLog>,
}

impl WitnessPublisher {
    pub fn new(logs: Vec<WitnessLog>) -> Self {
        Self { logs }
    }

    /// Standard layout: `witness1.jsonl` .. `witnessN.jsonl` under one
    /// directory. The logs may in reality live in separate trust domains.
    pub fn with_log_dir(dir: &Path, count: usize) -> Self {
        let logs = (1..=count)
            .map(|i| {
                let name = format!("witness{}", i);
                let path = dir.join(format!("{}.jsonl", name));
                WitnessLog::new(name, path)
            })
            .collect();
        Self::new(logs)
    }

    pub fn logs(&self) -> &[WitnessLog] {
        &self.logs
    }

    /// Append the batch's header record to every witness log. Individual
    /// write failures are reported and skipped; publication succeeds if
    /// at least one log accepted the record.
    pub fn publish(&self, batch: &Batch) -> Result<usize, ArchiveError> {
        let record = WitnessRecord::from_batch(batch);
        let mut successes = 0;

        for log in &self.logs {
            match log.append(&record) {
                Ok(()) => successes += 1,
                Err(e) => warn!("Witness write to {} failed: {}", log.name(), e),
            }
        }

        if successes == 0 {
            return Err(ArchiveError::WitnessError(format!(
                "All {} witness writes failed for batch {}",
                self.logs.len(),
                batch.header.sequence
            )));
        }

        info!(
            "Published batch {} to {}/{} witness logs",
            batch.header.sequence,
            successes,
            self.logs.len()
        );
        Ok(successes)
    }
}
