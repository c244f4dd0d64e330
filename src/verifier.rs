//! Download Verification
//!
//! Four-step client-side check of a downloaded document against the
//! event log, the batch set, and the witness logs. The steps run in
//! order and short-circuit at the first failure: content and signature
//! checks are cheap and local, batch and witness checks progressively
//! more expensive and only meaningful once the cheaper ones pass.

use secp256k1::PublicKey;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::batch::builder::BatchStore;
use crate::batch::merkle::generate_proof;
use crate::crypto::digest::sha256_hex;
use crate::crypto::signatures::SignatureManager;
use crate::error::ArchiveError;
use crate::events::log::EventLog;
use crate::witness::WitnessLog;

/// Reportable verification result. These are expected outcomes surfaced
/// to the caller, never errors, and never retried: each failure variant
/// is a security finding, not a transient fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid,
    ContentIntegrityFailed,
    SignatureInvalid,
    NotInAnyBatch,
    NoWitnessRecord,
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid => "All four checks passed; document is authentic",
            VerificationOutcome::ContentIntegrityFailed => {
                "Content hash does not match the recorded event"
            }
            VerificationOutcome::SignatureInvalid => "Event signature does not verify",
            VerificationOutcome::NotInAnyBatch => "Event is not committed in any batch",
            VerificationOutcome::NoWitnessRecord => "Batch is absent from every witness log",
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Client-side verifier. Holds only the public key; requires no access
/// to the custodian.
pub struct Verifier {
    manager: SignatureManager,
    public_key: PublicKey,
}

impl Verifier {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            manager: SignatureManager::new(),
            public_key,
        }
    }

    /// Run the four-step protocol for a downloaded document version.
    ///
    /// A document version with no recorded event at all is an
    /// `EventNotFound` error rather than an outcome: there is nothing to
    /// verify against.
    pub fn verify(
        &self,
        content: &[u8],
        document_id: Uuid,
        version: u64,
        event_log: &EventLog,
        batches: &BatchStore,
        witnesses: &[WitnessLog],
    ) -> Result<VerificationOutcome, ArchiveError> {
        let event = event_log
            .find(document_id, version)
            .ok_or_else(|| ArchiveError::EventNotFound {
                document_id: document_id.to_string(),
                version,
            })?;

        // Step 1: content integrity.
        let content_hash = sha256_hex(content);
        if event.file_hash.as_deref() != Some(content_hash.as_str()) {
            debug!(
                "Content hash {} does not match event {}",
                content_hash, event.event_hash
            );
            return Ok(VerificationOutcome::ContentIntegrityFailed);
        }

        // Step 2: event authenticity.
        if !self
            .manager
            .verify_digest(&event.event_hash, &event.signature, &self.public_key)?
        {
            return Ok(VerificationOutcome::SignatureInvalid);
        }

        // Step 3: batch inclusion. Linear scan over batches; the event
        // hash appears in at most one. A batch whose stored root does not
        // match the recomputed path does not count as inclusion.
        for batch in batches.all() {
            let leaves = batch.leaf_hashes();
            if let Some(index) = leaves.iter().position(|h| *h == event.event_hash) {
                let proof = generate_proof(&leaves, index)?;
                if proof.root_hash == batch.header.merkle_root && proof.verify()? {
                    // Step 4: witness presence for the containing batch.
                    return if self.witnessed(&batch.header_hash, batch.header.sequence, witnesses)? {
                        Ok(VerificationOutcome::Valid)
                    } else {
                        Ok(VerificationOutcome::NoWitnessRecord)
                    };
                }
            }
        }

        Ok(VerificationOutcome::NotInAnyBatch)
    }

    /// Check for the batch header in at least one witness log, with a
    /// matching sequence and a signature that verifies.
    fn witnessed(
        &self,
        header_hash: &str,
        sequence: u64,
        witnesses: &[WitnessLog],
    ) -> Result<bool, ArchiveError> {
        for log in witnesses {
            let records = match log.records() {
                Ok(records) => records,
                Err(e) => {
                    warn!("Witness {} unreadable during verification: {}", log.name(), e);
                    continue;
                }
            };

            for record in records {
                if record.sequence == sequence
                    && record.header_hash == header_hash
                    && self
                        .manager
                        .verify_digest(&record.header_hash, &record.signature, &self.public_key)?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
