//! ECDSA Signing and Verification
//!
//! Signatures are produced over 32-byte digests (the event hash or batch
//! header hash) and carried as hex-encoded compact signatures.

use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};

use crate::crypto::digest::decode_digest;
use crate::error::ArchiveError;

pub struct SignatureManager {
    secp: Secp256k1<All>,
}

impl SignatureManager {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Sign a hex digest, returning the hex-encoded compact signature.
    pub fn sign_digest(
        &self,
        digest_hex: &str,
        secret_key: &SecretKey,
    ) -> Result<String, ArchiveError> {
        let message = Message::from_digest_slice(&decode_digest(digest_hex)?)
            .map_err(|e| ArchiveError::CryptoError(format!("Invalid message digest: {}", e)))?;

        let signature = self.secp.sign_ecdsa(&message, secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }

    /// Verify a hex-encoded compact signature over a hex digest.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not
    /// verify; malformed signature bytes are also a verification failure,
    /// not an error, since they come from untrusted records.
    pub fn verify_digest(
        &self,
        digest_hex: &str,
        signature_hex: &str,
        public_key: &PublicKey,
    ) -> Result<bool, ArchiveError> {
        let message = Message::from_digest_slice(&decode_digest(digest_hex)?)
            .map_err(|e| ArchiveError::CryptoError(format!("Invalid message digest: {}", e)))?;

        let signature_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let signature = match Signature::from_compact(&signature_bytes) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        match self.secp.verify_ecdsa(&message, &signature, public_key) {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub fn public_key_from_secret(&self, secret_key: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, secret_key)
    }
}

impl Default for SignatureManager {
    fn default() -> Self {
        Self::new()
    }
}
