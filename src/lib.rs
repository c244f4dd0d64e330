//! Verifiable Document Archive
//!
//! Every upload, update, and deletion becomes a cryptographically signed,
//! hash-chained event. Events are periodically batched into a Merkle tree
//! and the signed batch header is anchored to a set of independent
//! append-only witness logs. Clients verify downloaded content against
//! the chain, the containing batch, and the witness logs to detect
//! tampering or silent deletion.
//!
//! Trust model in brief: the private key and the chain head live only
//! inside [`custodian::ChainCustodian`]; everything after batch
//! publication is tamper-evident against the witness logs. Events
//! awaiting batching sit in a plaintext log and are outside cryptographic
//! protection until the next batch close — see `events::log` for the
//! documented boundary.

pub mod archive;
pub mod auditor;
pub mod batch;
pub mod config;
pub mod crypto;
pub mod custodian;
pub mod error;
pub mod events;
pub mod store;
pub mod verifier;
pub mod witness;

pub use archive::Archive;
pub use auditor::{Auditor, SilentDeletion};
pub use batch::{Batch, BatchBuilder, BatchHeader, BatchStore};
pub use config::ArchiveConfig;
pub use custodian::ChainCustodian;
pub use error::ArchiveError;
pub use events::{EventAction, EventLog, SignedEvent};
pub use store::ObjectStore;
pub use verifier::{VerificationOutcome, Verifier};
pub use witness::{WitnessLog, WitnessPublisher, WitnessRecord};
