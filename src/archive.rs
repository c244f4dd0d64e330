//! Archive Facade
//!
//! Wires the custodian, event log, object store, batch builder, and
//! witness publisher into the upload/update/delete handlers, and exposes
//! verification and audit entry points. Upload, update, and delete run
//! under a single write lock, so version allocation, signing, and the
//! confirmed log append form one critical section; reads take snapshots
//! and mutate nothing.

use std::collections::HashMap;
use std::sync::Mutex;

use secp256k1::PublicKey;
use tracing::info;
use uuid::Uuid;

use crate::auditor::{Auditor, SilentDeletion};
use crate::batch::builder::{Batch, BatchBuilder, BatchStore};
use crate::config::ArchiveConfig;
use crate::crypto::keys::load_or_generate_keypair;
use crate::custodian::ChainCustodian;
use crate::error::ArchiveError;
use crate::events::log::EventLog;
use crate::events::record::{EventAction, EventFields, SignedEvent};
use crate::store::ObjectStore;
use crate::verifier::{VerificationOutcome, Verifier};
use crate::witness::{WitnessLog, WitnessPublisher};

pub struct Archive {
    custodian: ChainCustodian,
    event_log: EventLog,
    store: ObjectStore,
    builder: BatchBuilder,
    publisher: WitnessPublisher,
    verifier: Verifier,
    versions: Mutex<HashMap<Uuid, u64>>,
    write_lock: Mutex<()>,
    public_key: PublicKey,
}

impl Archive {
    /// Open (or create) an archive rooted at the configured data
    /// directory, replaying the durable logs to restore chain state and
    /// per-document versions.
    pub fn open(config: &ArchiveConfig) -> Result<Self, ArchiveError> {
        std::fs::create_dir_all(config.data_dir())?;

        let (secret_key, public_key) = load_or_generate_keypair(&config.key_dir())?;
        let event_log = EventLog::open(&config.event_log_path())?;
        let store = ObjectStore::open(&config.objects_dir())?;
        let batch_store = BatchStore::open(&config.batch_store_path())?;

        // The chain head is whichever artifact was signed last. A batch
        // close consumes every pending event, so if the batch store's
        // cursor covers the whole log the last signature was a batch
        // header; otherwise it was an event.
        let head = match batch_store.last_chain_hash() {
            Some(hash) if batch_store.events_consumed() == event_log.len() => hash,
            _ => event_log
                .last_chain_hash()
                .unwrap_or_else(crate::crypto::digest::genesis_hash),
        };
        let custodian = ChainCustodian::with_head(secret_key, head);

        let mut versions: HashMap<Uuid, u64> = HashMap::new();
        for event in event_log.all_events() {
            let entry = versions.entry(event.document_id).or_insert(0);
            if event.version > *entry {
                *entry = event.version;
            }
        }

        let publisher = WitnessPublisher::with_log_dir(&config.witness_dir(), config.witness_count);

        info!(
            "Archive opened: {} events, {} batches, chain head {}",
            event_log.len(),
            batch_store.len(),
            custodian.current_chain_hash()
        );

        Ok(Self {
            custodian,
            event_log,
            store,
            builder: BatchBuilder::new(batch_store),
            publisher,
            verifier: Verifier::new(public_key),
            versions: Mutex::new(versions),
            write_lock: Mutex::new(()),
            public_key,
        })
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sign the event fields, advance the chain, and durably append the
    /// record. The append is confirmed before success is reported, so a
    /// signed-but-unlogged event cannot be observed by a caller; if the
    /// append fails, the chain head is rescinded so runtime state never
    /// advances past an event absent from the log.
    fn record_event(&self, fields: EventFields) -> Result<SignedEvent, ArchiveError> {
        let link = self.custodian.sign_and_advance(&fields.event_hash())?;
        let event = fields.into_signed(link.clone());
        if let Err(e) = self.event_log.append(event.clone()) {
            self.custodian.rescind(&link);
            return Err(e);
        }

        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        versions.insert(event.document_id, event.version);
        Ok(event)
    }

    /// Store new content and sign its upload event. Assigns a fresh
    /// document id at version 1.
    pub fn upload(&self, content: &[u8]) -> Result<SignedEvent, ArchiveError> {
        let _guard = self.lock_writes();

        let file_hash = self.store.put(content)?;
        let fields = EventFields::new(Uuid::new_v4(), 1, EventAction::Upload, Some(file_hash));
        let event = self.record_event(fields)?;
        info!("Uploaded {}", event.summary());
        Ok(event)
    }

    /// Store a new version of an existing document.
    pub fn update(&self, document_id: Uuid, content: &[u8]) -> Result<SignedEvent, ArchiveError> {
        let _guard = self.lock_writes();

        let next_version = self.next_version(document_id)?;
        let file_hash = self.store.put(content)?;
        let fields = EventFields::new(document_id, next_version, EventAction::Update, Some(file_hash));
        let event = self.record_event(fields)?;
        info!("Updated {}", event.summary());
        Ok(event)
    }

    /// Remove a document's current content through the authorized path:
    /// a signed delete event plus blob removal. The delete event is made
    /// durable before the blob is touched; a removal failure can leave
    /// content behind, never an unlogged deletion.
    pub fn delete(&self, document_id: Uuid) -> Result<SignedEvent, ArchiveError> {
        let _guard = self.lock_writes();

        let current = self.latest_version(document_id)?;
        let previous_hash = self
            .event_log
            .find(document_id, current)
            .and_then(|e| e.file_hash);

        let fields = EventFields::new(document_id, current + 1, EventAction::Delete, None);
        let event = self.record_event(fields)?;

        if let Some(hash) = previous_hash {
            self.store.remove(&hash)?;
        }
        info!("Deleted {}", event.summary());
        Ok(event)
    }

    fn latest_version(&self, document_id: Uuid) -> Result<u64, ArchiveError> {
        self.versions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&document_id)
            .copied()
            .ok_or_else(|| ArchiveError::UnknownDocument(document_id.to_string()))
    }

    fn next_version(&self, document_id: Uuid) -> Result<u64, ArchiveError> {
        Ok(self.latest_version(document_id)? + 1)
    }

    /// Fetch stored content for a document version, if the blob is still
    /// present.
    pub fn download(&self, document_id: Uuid, version: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        let event = self
            .event_log
            .find(document_id, version)
            .ok_or_else(|| ArchiveError::EventNotFound {
                document_id: document_id.to_string(),
                version,
            })?;
        match event.file_hash {
            Some(hash) => self.store.get(&hash),
            None => Ok(None),
        }
    }

    /// Close the current collection window. `Ok(None)` when nothing is
    /// pending.
    pub fn close_batch(&self) -> Result<Option<Batch>, ArchiveError> {
        self.builder.close_batch(&self.custodian, &self.event_log)
    }

    /// Replicate a closed batch's header to the witness logs.
    pub fn publish(&self, batch: &Batch) -> Result<usize, ArchiveError> {
        self.publisher.publish(batch)
    }

    /// Close and publish in one step, the periodic-commit path.
    pub fn close_and_publish(&self) -> Result<Option<Batch>, ArchiveError> {
        match self.close_batch()? {
            Some(batch) => {
                self.publish(&batch)?;
                Ok(Some(batch))
            }
            None => Ok(None),
        }
    }

    /// Run the four-step verification protocol for downloaded content.
    pub fn verify(
        &self,
        content: &[u8],
        document_id: Uuid,
        version: u64,
    ) -> Result<VerificationOutcome, ArchiveError> {
        self.verifier.verify(
            content,
            document_id,
            version,
            &self.event_log,
            self.builder.store(),
            self.publisher.logs(),
        )
    }

    /// Scan for documents removed outside the delete handler.
    pub fn find_silent_deletions(&self) -> Vec<SilentDeletion> {
        Auditor::find_silent_deletions(&self.event_log, &self.store)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn current_chain_hash(&self) -> String {
        self.custodian.current_chain_hash()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn batches(&self) -> &BatchStore {
        self.builder.store()
    }

    pub fn witness_logs(&self) -> &[WitnessLog] {
        self.publisher.logs()
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_archive(dir: &std::path::Path) -> Archive {
        let config = ArchiveConfig::with_data_dir(dir.to_path_buf(), 3).unwrap();
        Archive::open(&config).unwrap()
    }

    #[test]
    fn test_upload_stores_blob_and_event() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        let event = archive.upload(b"contract text").unwrap();
        assert_eq!(event.version, 1);
        assert_eq!(event.action, EventAction::Upload);
        assert!(archive.object_store().exists(event.file_hash.as_ref().unwrap()));
        assert_eq!(archive.event_log().len(), 1);
    }

    #[test]
    fn test_update_increments_version() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        let uploaded = archive.upload(b"v1").unwrap();
        let updated = archive.update(uploaded.document_id, b"v2").unwrap();

        assert_eq!(updated.document_id, uploaded.document_id);
        assert_eq!(updated.version, 2);
        assert_ne!(updated.file_hash, uploaded.file_hash);
    }

    #[test]
    fn test_update_unknown_document_fails() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        assert!(matches!(
            archive.update(Uuid::new_v4(), b"content"),
            Err(ArchiveError::UnknownDocument(_))
        ));
    }

    #[test]
    fn test_delete_removes_blob_and_records_event() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        let uploaded = archive.upload(b"short-lived").unwrap();
        let deleted = archive.delete(uploaded.document_id).unwrap();

        assert_eq!(deleted.action, EventAction::Delete);
        assert_eq!(deleted.version, 2);
        assert!(deleted.file_hash.is_none());
        assert!(!archive.object_store().exists(uploaded.file_hash.as_ref().unwrap()));
    }

    #[test]
    fn test_concurrent_updates_allocate_distinct_versions() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());
        let doc = archive.upload(b"v1").unwrap();

        std::thread::scope(|s| {
            for i in 0..4u8 {
                let archive = &archive;
                let id = doc.document_id;
                s.spawn(move || {
                    archive.update(id, &[i]).unwrap();
                });
            }
        });

        let mut versions: Vec<u64> = archive
            .event_log()
            .all_events()
            .iter()
            .filter(|e| e.document_id == doc.document_id)
            .map(|e| e.version)
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_delete_event_is_durable_before_blob_removal() {
        let dir = tempdir().unwrap();
        let config = ArchiveConfig::with_data_dir(dir.path().to_path_buf(), 3).unwrap();
        let archive = Archive::open(&config).unwrap();

        let doc = archive.upload(b"stubborn blob").unwrap();

        // Make the blob unremovable by replacing it with a directory.
        let blob_path = config.objects_dir().join(doc.file_hash.as_deref().unwrap());
        std::fs::remove_file(&blob_path).unwrap();
        std::fs::create_dir(&blob_path).unwrap();
        std::fs::write(blob_path.join("occupant"), b"x").unwrap();

        assert!(archive.delete(doc.document_id).is_err());

        // The authorizing delete event was recorded before removal was
        // attempted, so no silent deletion can be manufactured.
        let recorded = archive.event_log().find(doc.document_id, 2).unwrap();
        assert_eq!(recorded.action, EventAction::Delete);
        assert!(archive.find_silent_deletions().is_empty());
    }

    #[test]
    fn test_download_returns_stored_content() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        let event = archive.upload(b"the payload").unwrap();
        let content = archive.download(event.document_id, 1).unwrap().unwrap();
        assert_eq!(content, b"the payload");
    }

    #[test]
    fn test_reopen_restores_chain_and_versions() {
        let dir = tempdir().unwrap();
        let config = ArchiveConfig::with_data_dir(dir.path().to_path_buf(), 3).unwrap();

        let (doc_id, head_after_events) = {
            let archive = Archive::open(&config).unwrap();
            let event = archive.upload(b"persisted").unwrap();
            archive.update(event.document_id, b"persisted v2").unwrap();
            (event.document_id, archive.current_chain_hash())
        };

        let reopened = Archive::open(&config).unwrap();
        assert_eq!(reopened.current_chain_hash(), head_after_events);

        // Version map restored: the next update gets version 3.
        let updated = reopened.update(doc_id, b"persisted v3").unwrap();
        assert_eq!(updated.version, 3);
    }

    #[test]
    fn test_reopen_after_batch_close_resumes_from_batch_chain_hash() {
        let dir = tempdir().unwrap();
        let config = ArchiveConfig::with_data_dir(dir.path().to_path_buf(), 3).unwrap();

        let batch_chain_hash = {
            let archive = Archive::open(&config).unwrap();
            archive.upload(b"a").unwrap();
            archive.upload(b"b").unwrap();
            let batch = archive.close_and_publish().unwrap().unwrap();
            batch.chain_hash
        };

        let reopened = Archive::open(&config).unwrap();
        assert_eq!(reopened.current_chain_hash(), batch_chain_hash);
    }

    #[test]
    fn test_events_after_batch_link_to_batch_chain_hash() {
        let dir = tempdir().unwrap();
        let archive = open_archive(dir.path());

        archive.upload(b"first").unwrap();
        let batch = archive.close_and_publish().unwrap().unwrap();

        let next = archive.upload(b"second").unwrap();
        assert_eq!(next.previous_chain_hash, batch.chain_hash);
    }
}
