//! Event Log
//!
//! Durable, ordered, append-only JSONL record of signed events awaiting
//! batch publication. Append order is the only ordering authority in the
//! system; batches must preserve it.
//!
//! Trust boundary: these records sit in a plaintext file until they are
//! committed to a batch. An attacker who can rewrite the file before the
//! next batch close can forge history without detection by the witness
//! logs. This is a documented limitation of the design, not something the
//! log itself defends against.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::digest::chain_digest;
use crate::error::ArchiveError;
use crate::events::record::SignedEvent;

pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
    entries: Mutex<Vec<SignedEvent>>,
}

impl EventLog {
    /// Open the log at `path`, replaying any existing records. Each
    /// replayed event must pass an event-hash recomputation and its chain
    /// link must be internally consistent.
    ///
    /// Adjacent log entries do not necessarily link to each other: batch
    /// header signings advance the same chain between events, so an
    /// event's previous chain hash may be a batch's chain hash.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::EventLogError(format!("Failed to create log directory: {}", e))
            })?;
        }

        let entries = if path.exists() {
            Self::replay(path)?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ArchiveError::EventLogError(format!("Failed to open event log: {}", e)))?;

        if !entries.is_empty() {
            info!("Replayed {} events from {}", entries.len(), path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            entries: Mutex::new(entries),
        })
    }

    fn replay(path: &Path) -> Result<Vec<SignedEvent>, ArchiveError> {
        let file = File::open(path)
            .map_err(|e| ArchiveError::EventLogError(format!("Failed to open event log: {}", e)))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                ArchiveError::EventLogError(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let event: SignedEvent = serde_json::from_str(&line).map_err(|e| {
                ArchiveError::EventLogError(format!(
                    "Failed to parse event at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            if !event.verify_hash() {
                return Err(ArchiveError::EventLogError(format!(
                    "Event hash mismatch at line {}",
                    line_num + 1
                )));
            }
            let expected_chain =
                chain_digest(&event.event_hash, &event.previous_chain_hash)?;
            if event.chain_hash != expected_chain {
                return Err(ArchiveError::EventLogError(format!(
                    "Chain hash mismatch at line {}",
                    line_num + 1
                )));
            }

            entries.push(event);
        }

        Ok(entries)
    }

    /// Append a signed event. The write is flushed and confirmed before
    /// this returns, so a successful append means the event is durable.
    pub fn append(&self, event: SignedEvent) -> Result<(), ArchiveError> {
        if !event.verify_hash() {
            return Err(ArchiveError::EventLogError(
                "Refusing to append event with invalid hash".to_string(),
            ));
        }

        let json = serde_json::to_string(&event)?;

        {
            let mut file = self.file.lock().map_err(|e| {
                ArchiveError::EventLogError(format!("Event log lock poisoned: {}", e))
            })?;
            writeln!(file, "{}", json).map_err(|e| {
                ArchiveError::EventLogError(format!("Failed to write event: {}", e))
            })?;
            file.flush().map_err(|e| {
                ArchiveError::EventLogError(format!("Failed to flush event log: {}", e))
            })?;
        }

        debug!("Appended event: {}", event.summary());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }

    /// Events appended at or after `cursor`, in append order. The cursor
    /// is the number of events already consumed by closed batches.
    pub fn pending_since(&self, cursor: usize) -> Vec<SignedEvent> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(cursor..).unwrap_or(&[]).to_vec()
    }

    /// Full event history, for audit use.
    pub fn all_events(&self) -> Vec<SignedEvent> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Look up the event for a specific document version.
    pub fn find(&self, document_id: Uuid, version: u64) -> Option<SignedEvent> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.document_id == document_id && e.version == version)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chain hash of the most recently appended event, if any.
    pub fn last_chain_hash(&self) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|e| e.chain_hash.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest::sha256_hex;
    use crate::crypto::keys::generate_keypair;
    use crate::custodian::ChainCustodian;
    use crate::events::record::{EventAction, EventFields};
    use tempfile::tempdir;

    fn make_event(custodian: &ChainCustodian, content: &[u8]) -> SignedEvent {
        let fields = EventFields::new(
            Uuid::new_v4(),
            1,
            EventAction::Upload,
            Some(sha256_hex(content)),
        );
        let link = custodian.sign_and_advance(&fields.event_hash()).unwrap();
        fields.into_signed(link)
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        log.append(make_event(&custodian, b"one")).unwrap();
        log.append(make_event(&custodian, b"two")).unwrap();

        assert_eq!(log.len(), 2);
        let events = log.all_events();
        assert_eq!(events[0].file_hash.as_deref(), Some(sha256_hex(b"one").as_str()));
    }

    #[test]
    fn test_pending_since_cursor() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        for i in 0..5u8 {
            log.append(make_event(&custodian, &[i])).unwrap();
        }

        assert_eq!(log.pending_since(0).len(), 5);
        assert_eq!(log.pending_since(3).len(), 2);
        assert_eq!(log.pending_since(5).len(), 0);
        assert_eq!(log.pending_since(9).len(), 0);
    }

    #[test]
    fn test_replay_restores_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let last_hash = {
            let log = EventLog::open(&path).unwrap();
            log.append(make_event(&custodian, b"a")).unwrap();
            log.append(make_event(&custodian, b"b")).unwrap();
            log.last_chain_hash().unwrap()
        };

        let reopened = EventLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.last_chain_hash().unwrap(), last_hash);
    }

    #[test]
    fn test_replay_rejects_tampered_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        {
            let log = EventLog::open(&path).unwrap();
            log.append(make_event(&custodian, b"a")).unwrap();
        }

        // Rewrite the record with a bumped version, leaving the stored
        // hash stale.
        let contents = std::fs::read_to_string(&path).unwrap();
        let tampered = contents.replace("\"version\":1", "\"version\":7");
        std::fs::write(&path, tampered).unwrap();

        assert!(EventLog::open(&path).is_err());
    }

    #[test]
    fn test_find_by_document_and_version() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(&dir.path().join("events.jsonl")).unwrap();

        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let event = make_event(&custodian, b"payload");
        let id = event.document_id;
        log.append(event).unwrap();

        assert!(log.find(id, 1).is_some());
        assert!(log.find(id, 2).is_none());
        assert!(log.find(Uuid::new_v4(), 1).is_none());
    }
}
