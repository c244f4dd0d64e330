//! Batch Construction and Persistence
//!
//! Drains pending events from the event log, commits them under a Merkle
//! root, and links the signed header to the previous batch. Header
//! signatures flow through the same `sign_and_advance` primitive as
//! events, so batch closure also advances the chain and event history and
//! batch history form one hash chain.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::merkle::merkle_root;
use crate::crypto::digest::{genesis_hash, sha256_hex};
use crate::custodian::ChainCustodian;
use crate::error::ArchiveError;
use crate::events::log::EventLog;
use crate::events::record::SignedEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHeader {
    pub sequence: u64,
    pub merkle_root: String,
    pub previous_header_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl BatchHeader {
    /// Canonical encoding in fixed field order, hashed to produce the
    /// header hash the custodian signs.
    pub fn canonical_string(&self) -> String {
        format!(
            "sequence:{}|merkle_root:{}|previous_header_hash:{}|timestamp:{}",
            self.sequence,
            self.merkle_root,
            self.previous_header_hash,
            self.timestamp.to_rfc3339()
        )
    }

    pub fn header_hash(&self) -> String {
        sha256_hex(self.canonical_string().as_bytes())
    }
}

/// Immutable closed batch: signed header plus the ordered event list it
/// commits to. Never re-opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub header: BatchHeader,
    pub header_hash: String,
    pub signature: String,
    pub previous_chain_hash: String,
    pub chain_hash: String,
    pub events: Vec<SignedEvent>,
}

impl Batch {
    pub fn verify_header_hash(&self) -> bool {
        self.header_hash == self.header.header_hash()
    }

    /// The batch's Merkle leaves: its event hashes, in event-log order.
    pub fn leaf_hashes(&self) -> Vec<String> {
        self.events.iter().map(|e| e.event_hash.clone()).collect()
    }
}

/// Append-only JSONL persistence for closed batches, replayed on open.
pub struct BatchStore {
    path: PathBuf,
    file: Mutex<File>,
    batches: Mutex<Vec<Batch>>,
}

impl BatchStore {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::BatchError(format!("Failed to create batch directory: {}", e))
            })?;
        }

        let batches = if path.exists() {
            Self::replay(path)?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ArchiveError::BatchError(format!("Failed to open batch store: {}", e)))?;

        if !batches.is_empty() {
            info!("Replayed {} batches from {}", batches.len(), path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            batches: Mutex::new(batches),
        })
    }

    fn replay(path: &Path) -> Result<Vec<Batch>, ArchiveError> {
        let file = File::open(path)
            .map_err(|e| ArchiveError::BatchError(format!("Failed to open batch store: {}", e)))?;
        let reader = BufReader::new(file);
        let mut batches: Vec<Batch> = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                ArchiveError::BatchError(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let batch: Batch = serde_json::from_str(&line).map_err(|e| {
                ArchiveError::BatchError(format!(
                    "Failed to parse batch at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            if !batch.verify_header_hash() {
                return Err(ArchiveError::BatchError(format!(
                    "Header hash mismatch in batch {}",
                    batch.header.sequence
                )));
            }
            let expected_previous = batches
                .last()
                .map(|b| b.header_hash.clone())
                .unwrap_or_else(genesis_hash);
            if batch.header.previous_header_hash != expected_previous {
                return Err(ArchiveError::BatchError(format!(
                    "Batch {} does not link to its predecessor",
                    batch.header.sequence
                )));
            }

            batches.push(batch);
        }

        Ok(batches)
    }

    fn append(&self, batch: Batch) -> Result<(), ArchiveError> {
        let json = serde_json::to_string(&batch)?;

        {
            let mut file = self.file.lock().map_err(|e| {
                ArchiveError::BatchError(format!("Batch store lock poisoned: {}", e))
            })?;
            writeln!(file, "{}", json)
                .map_err(|e| ArchiveError::BatchError(format!("Failed to write batch: {}", e)))?;
            file.flush().map_err(|e| {
                ArchiveError::BatchError(format!("Failed to flush batch store: {}", e))
            })?;
        }

        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch);
        Ok(())
    }

    pub fn all(&self) -> Vec<Batch> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header hash of the most recent batch, or the genesis constant.
    pub fn last_header_hash(&self) -> String {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|b| b.header_hash.clone())
            .unwrap_or_else(genesis_hash)
    }

    pub fn next_sequence(&self) -> u64 {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|b| b.header.sequence + 1)
            .unwrap_or(0)
    }

    /// Number of event-log entries consumed by closed batches; the event
    /// log cursor for the next close.
    pub fn events_consumed(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|b| b.events.len())
            .sum()
    }

    /// Chain hash recorded when the most recent batch header was signed.
    pub fn last_chain_hash(&self) -> Option<String> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|b| b.chain_hash.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Closes collection windows: drains pending events into an immutable,
/// Merkle-committed, custodian-signed batch.
pub struct BatchBuilder {
    store: BatchStore,
    close_lock: Mutex<()>,
}

impl BatchBuilder {
    pub fn new(store: BatchStore) -> Self {
        Self {
            store,
            close_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &BatchStore {
        &self.store
    }

    /// Close the current collection window. Returns `Ok(None)` when no
    /// events are pending; closing with nothing to commit is a no-op.
    ///
    /// The pending set is snapshotted before the root is computed, so no
    /// event can slip into the batch after its Merkle root exists.
    pub fn close_batch(
        &self,
        custodian: &ChainCustodian,
        event_log: &EventLog,
    ) -> Result<Option<Batch>, ArchiveError> {
        // One close at a time: cursor read, root computation, signing,
        // and persist must all observe the same frozen prefix, or two
        // closers would commit the same events under the same sequence.
        let _close_guard = self.close_lock.lock().map_err(|e| {
            ArchiveError::BatchError(format!("Batch builder lock poisoned: {}", e))
        })?;

        let events = event_log.pending_since(self.store.events_consumed());
        if events.is_empty() {
            debug!("No pending events; skipping batch close");
            return Ok(None);
        }

        let leaves: Vec<String> = events.iter().map(|e| e.event_hash.clone()).collect();
        let root = merkle_root(&leaves)?;

        let header = BatchHeader {
            sequence: self.store.next_sequence(),
            merkle_root: root,
            previous_header_hash: self.store.last_header_hash(),
            timestamp: Utc::now(),
        };
        let header_hash = header.header_hash();
        let link = custodian.sign_and_advance(&header_hash)?;

        let batch = Batch {
            header,
            header_hash,
            signature: link.signature.clone(),
            previous_chain_hash: link.previous_chain_hash.clone(),
            chain_hash: link.chain_hash.clone(),
            events,
        };

        // A batch that cannot be persisted must not leave the chain head
        // pointing at it.
        if let Err(e) = self.store.append(batch.clone()) {
            custodian.rescind(&link);
            return Err(e);
        }
        info!(
            "Closed batch {} with {} events, root {}",
            batch.header.sequence,
            batch.events.len(),
            batch.header.merkle_root
        );
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest::chain_digest;
    use crate::crypto::keys::generate_keypair;
    use crate::crypto::signatures::SignatureManager;
    use crate::events::record::{EventAction, EventFields};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record_event(custodian: &ChainCustodian, log: &EventLog, content: &[u8]) {
        let fields = EventFields::new(
            Uuid::new_v4(),
            1,
            EventAction::Upload,
            Some(sha256_hex(content)),
        );
        let link = custodian.sign_and_advance(&fields.event_hash()).unwrap();
        log.append(fields.into_signed(link)).unwrap();
    }

    fn setup(dir: &Path) -> (ChainCustodian, EventLog, BatchBuilder) {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);
        let log = EventLog::open(&dir.join("events.jsonl")).unwrap();
        let store = BatchStore::open(&dir.join("batches.jsonl")).unwrap();
        (custodian, log, BatchBuilder::new(store))
    }

    #[test]
    fn test_close_with_no_events_is_noop() {
        let dir = tempdir().unwrap();
        let (custodian, log, builder) = setup(dir.path());

        assert!(builder.close_batch(&custodian, &log).unwrap().is_none());
        assert!(builder.store().is_empty());
    }

    #[test]
    fn test_first_batch_links_to_genesis() {
        let dir = tempdir().unwrap();
        let (custodian, log, builder) = setup(dir.path());

        record_event(&custodian, &log, b"a");
        let batch = builder.close_batch(&custodian, &log).unwrap().unwrap();

        assert_eq!(batch.header.sequence, 0);
        assert_eq!(batch.header.previous_header_hash, genesis_hash());
        assert_eq!(batch.events.len(), 1);
        // Single-leaf batch: root is the event hash itself.
        assert_eq!(batch.header.merkle_root, batch.events[0].event_hash);
    }

    #[test]
    fn test_batches_are_disjoint_and_linked() {
        let dir = tempdir().unwrap();
        let (custodian, log, builder) = setup(dir.path());

        record_event(&custodian, &log, b"a");
        record_event(&custodian, &log, b"b");
        record_event(&custodian, &log, b"c");
        let first = builder.close_batch(&custodian, &log).unwrap().unwrap();

        record_event(&custodian, &log, b"d");
        let second = builder.close_batch(&custodian, &log).unwrap().unwrap();

        assert_eq!(first.events.len(), 3);
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.header.sequence, 1);
        assert_eq!(second.header.previous_header_hash, first.header_hash);

        let first_hashes: Vec<&String> = first.events.iter().map(|e| &e.event_hash).collect();
        assert!(!first_hashes.contains(&&second.events[0].event_hash));
    }

    #[test]
    fn test_batch_close_advances_chain() {
        let dir = tempdir().unwrap();
        let (custodian, log, builder) = setup(dir.path());

        record_event(&custodian, &log, b"a");
        let head_before = custodian.current_chain_hash();
        let batch = builder.close_batch(&custodian, &log).unwrap().unwrap();

        assert_eq!(batch.previous_chain_hash, head_before);
        assert_eq!(
            batch.chain_hash,
            chain_digest(&batch.header_hash, &head_before).unwrap()
        );
        assert_eq!(custodian.current_chain_hash(), batch.chain_hash);
    }

    #[test]
    fn test_header_signature_verifies() {
        let dir = tempdir().unwrap();
        let (secret, public) = generate_keypair();
        let custodian = ChainCustodian::new(secret);
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();
        let builder = BatchBuilder::new(BatchStore::open(&dir.path().join("batches.jsonl")).unwrap());

        record_event(&custodian, &log, b"a");
        let batch = builder.close_batch(&custodian, &log).unwrap().unwrap();

        let manager = SignatureManager::new();
        assert!(manager
            .verify_digest(&batch.header_hash, &batch.signature, &public)
            .unwrap());
    }

    #[test]
    fn test_concurrent_closes_commit_events_exactly_once() {
        let dir = tempdir().unwrap();
        let (custodian, log, builder) = setup(dir.path());

        record_event(&custodian, &log, b"a");
        record_event(&custodian, &log, b"b");
        record_event(&custodian, &log, b"c");

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    builder.close_batch(&custodian, &log).unwrap();
                });
            }
        });

        // One closer wins the pending set; the rest see an empty window.
        assert_eq!(builder.store().len(), 1);
        assert_eq!(builder.store().events_consumed(), 3);
        assert_eq!(builder.store().next_sequence(), 1);

        // The persisted file replays cleanly.
        let reopened = BatchStore::open(builder.store().path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_store_replay_restores_cursor_and_links() {
        let dir = tempdir().unwrap();
        let batches_path = dir.path().join("batches.jsonl");

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();

        {
            let builder = BatchBuilder::new(BatchStore::open(&batches_path).unwrap());
            record_event(&custodian, &log, b"a");
            record_event(&custodian, &log, b"b");
            builder.close_batch(&custodian, &log).unwrap();
            record_event(&custodian, &log, b"c");
            builder.close_batch(&custodian, &log).unwrap();
        }

        let reopened = BatchStore::open(&batches_path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.events_consumed(), 3);
        assert_eq!(reopened.next_sequence(), 2);
    }

    #[test]
    fn test_store_replay_rejects_broken_link() {
        let dir = tempdir().unwrap();
        let batches_path = dir.path().join("batches.jsonl");

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();

        {
            let builder = BatchBuilder::new(BatchStore::open(&batches_path).unwrap());
            record_event(&custodian, &log, b"a");
            builder.close_batch(&custodian, &log).unwrap();
            record_event(&custodian, &log, b"b");
            builder.close_batch(&custodian, &log).unwrap();
        }

        // Drop batch 0 so batch 1's previous header no longer resolves.
        let contents = std::fs::read_to_string(&batches_path).unwrap();
        let second_line = contents.lines().nth(1).unwrap().to_string();
        std::fs::write(&batches_path, format!("{}\n", second_line)).unwrap();

        assert!(BatchStore::open(&batches_path).is_err());
    }
}
