//! Silent-Deletion Auditor
//!
//! Cross-checks the full event history against the live object store.
//! A document whose latest event still promises content, but whose blob
//! is gone, was deleted outside the archive's own delete handler.

use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::events::log::EventLog;
use crate::events::record::{EventAction, SignedEvent};
use crate::store::ObjectStore;

/// Evidence for one flagged document.
#[derive(Debug, Clone)]
pub struct SilentDeletion {
    pub document_id: Uuid,
    pub last_event: SignedEvent,
    pub missing_hash: String,
}

pub struct Auditor;

impl Auditor {
    /// Scan every document's latest event. Documents whose latest event
    /// is an upload or update but whose referenced content is absent from
    /// the store are flagged. A document closed by a delete event is
    /// never flagged.
    pub fn find_silent_deletions(event_log: &EventLog, store: &ObjectStore) -> Vec<SilentDeletion> {
        let mut latest: HashMap<Uuid, SignedEvent> = HashMap::new();
        for event in event_log.all_events() {
            match latest.get(&event.document_id) {
                Some(existing) if existing.version >= event.version => {}
                _ => {
                    latest.insert(event.document_id, event);
                }
            }
        }

        let mut findings = Vec::new();
        for (document_id, event) in latest {
            if event.action == EventAction::Delete {
                continue;
            }
            let Some(hash) = event.file_hash.clone() else {
                continue;
            };
            if !store.exists(&hash) {
                warn!(
                    "Silent deletion: document {} v{} references missing blob {}",
                    document_id, event.version, hash
                );
                findings.push(SilentDeletion {
                    document_id,
                    last_event: event,
                    missing_hash: hash,
                });
            }
        }

        info!(
            "Audit complete: {} silently deleted document(s)",
            findings.len()
        );
        findings
    }
}
