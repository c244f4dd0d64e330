//! Signed Event Records
//!
//! One signed, chained record per upload/update/delete action. The event
//! hash is a pure function of the event's own fields; the signature and
//! the chain link are added by the custodian and excluded from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::digest::sha256_hex;
use crate::custodian::ChainLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Upload,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Upload => "upload",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

/// The fields an event is hashed over, before the custodian signs it.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub document_id: Uuid,
    pub version: u64,
    pub action: EventAction,
    pub file_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EventFields {
    pub fn new(
        document_id: Uuid,
        version: u64,
        action: EventAction,
        file_hash: Option<String>,
    ) -> Self {
        Self {
            document_id,
            version,
            action,
            file_hash,
            timestamp: Utc::now(),
        }
    }

    /// Canonical encoding in fixed field order. Delete events carry no
    /// file hash and encode it as the empty string.
    pub fn canonical_string(&self) -> String {
        format!(
            "action:{}|document_id:{}|version:{}|file_hash:{}|timestamp:{}",
            self.action.as_str(),
            self.document_id,
            self.version,
            self.file_hash.as_deref().unwrap_or(""),
            self.timestamp.to_rfc3339()
        )
    }

    pub fn event_hash(&self) -> String {
        sha256_hex(self.canonical_string().as_bytes())
    }

    /// Seal the fields with the chain link produced by the custodian.
    pub fn into_signed(self, link: ChainLink) -> SignedEvent {
        let event_hash = self.event_hash();
        SignedEvent {
            document_id: self.document_id,
            version: self.version,
            action: self.action,
            file_hash: self.file_hash,
            timestamp: self.timestamp,
            event_hash,
            previous_chain_hash: link.previous_chain_hash,
            chain_hash: link.chain_hash,
            signature: link.signature,
        }
    }
}

/// Immutable signed event as persisted to the event log and embedded,
/// unmodified, as a leaf in exactly one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEvent {
    pub document_id: Uuid,
    pub version: u64,
    pub action: EventAction,
    pub file_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub event_hash: String,
    pub previous_chain_hash: String,
    pub chain_hash: String,
    pub signature: String,
}

impl SignedEvent {
    pub fn canonical_string(&self) -> String {
        EventFields {
            document_id: self.document_id,
            version: self.version,
            action: self.action,
            file_hash: self.file_hash.clone(),
            timestamp: self.timestamp,
        }
        .canonical_string()
    }

    /// Recompute the event hash from the fields.
    pub fn compute_event_hash(&self) -> String {
        sha256_hex(self.canonical_string().as_bytes())
    }

    /// Check the stored event hash against a recomputation.
    pub fn verify_hash(&self) -> bool {
        self.event_hash == self.compute_event_hash()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} v{} ({})",
            self.action.as_str(),
            self.document_id,
            self.version,
            self.file_hash.as_deref().unwrap_or("-")
        )
    }
}
