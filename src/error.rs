use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Object store error: {0}")]
    StorageError(String),

    #[error("Event log error: {0}")]
    EventLogError(String),

    #[error("Batch error: {0}")]
    BatchError(String),

    #[error("Witness publication failed: {0}")]
    WitnessError(String),

    #[error("Chain custodian unavailable: {0}")]
    ChainUnavailable(String),

    #[error("No event recorded for document {document_id} version {version}")]
    EventNotFound { document_id: String, version: u64 },

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::EventLogError(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(format!("I/O error: {}", err))
    }
}
