//! Digest Primitives
//!
//! SHA-256 helpers shared by the chain custodian, the batch builder and
//! the verifier. All digests are carried as 64-character lowercase hex.

use sha2::{Digest, Sha256};

use crate::error::ArchiveError;

/// Hash raw bytes, returning the hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fixed genesis value used as the chain head before any event is signed
/// and as batch 0's previous header hash.
pub fn genesis_hash() -> String {
    sha256_hex(b"genesis")
}

/// Advance the hash chain: `sha256(raw(event_hash) || raw(previous))`.
///
/// Both inputs must be hex digests; the concatenation is over the raw
/// digest bytes, not the hex text.
pub fn chain_digest(event_hash: &str, previous: &str) -> Result<String, ArchiveError> {
    let mut combined = decode_digest(event_hash)?;
    combined.extend(decode_digest(previous)?);
    Ok(sha256_hex(&combined))
}

/// Decode a hex digest string into its 32 raw bytes.
pub fn decode_digest(digest_hex: &str) -> Result<Vec<u8>, ArchiveError> {
    let bytes = hex::decode(digest_hex)
        .map_err(|e| ArchiveError::CryptoError(format!("Invalid hex digest: {}", e)))?;
    if bytes.len() != 32 {
        return Err(ArchiveError::CryptoError(format!(
            "Digest must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
