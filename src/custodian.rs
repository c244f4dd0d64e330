//! Chain Custodian
//!
//! Simulated HSM boundary: the only component holding the private signing
//! key and the running chain head. Every signed artifact in the system
//! (events and batch headers alike) passes through `sign_and_advance`, so
//! event history and batch history form a single hash chain.

use std::sync::Mutex;

use secp256k1::{PublicKey, SecretKey};
use tracing::debug;

use crate::crypto::digest::{chain_digest, genesis_hash};
use crate::crypto::signatures::SignatureManager;
use crate::error::ArchiveError;

/// Result of one indivisible sign-and-chain operation.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub previous_chain_hash: String,
    pub chain_hash: String,
    pub signature: String,
}

/// Owns the private key and the latest chain hash. The secret key is a
/// private field and is never handed out; other components may only call
/// into the custodian.
pub struct ChainCustodian {
    manager: SignatureManager,
    secret_key: SecretKey,
    public_key: PublicKey,
    head: Mutex<String>,
}

impl ChainCustodian {
    /// Create a custodian with the chain head at genesis.
    pub fn new(secret_key: SecretKey) -> Self {
        let manager = SignatureManager::new();
        let public_key = manager.public_key_from_secret(&secret_key);
        Self {
            manager,
            secret_key,
            public_key,
            head: Mutex::new(genesis_hash()),
        }
    }

    /// Create a custodian resuming from a previously persisted chain head.
    /// Used on archive restart after replaying the durable logs.
    pub fn with_head(secret_key: SecretKey, head: String) -> Self {
        let custodian = Self::new(secret_key);
        *custodian.head.lock().unwrap_or_else(|e| e.into_inner()) = head;
        custodian
    }

    /// Sign a digest and advance the chain in one critical section.
    ///
    /// No caller can observe the chain head advance without also receiving
    /// the signature that caused it: the signature is computed before the
    /// head is mutated, and a signing failure leaves the chain untouched.
    pub fn sign_and_advance(&self, digest_hex: &str) -> Result<ChainLink, ArchiveError> {
        let mut head = self
            .head
            .lock()
            .map_err(|e| ArchiveError::ChainUnavailable(format!("Chain state poisoned: {}", e)))?;

        let previous_chain_hash = head.clone();
        let chain_hash = chain_digest(digest_hex, &previous_chain_hash)?;
        let signature = self
            .manager
            .sign_digest(digest_hex, &self.secret_key)
            .map_err(|e| ArchiveError::ChainUnavailable(format!("Signing failed: {}", e)))?;

        *head = chain_hash.clone();
        debug!("Chain advanced to {}", chain_hash);

        Ok(ChainLink {
            previous_chain_hash,
            chain_hash,
            signature,
        })
    }

    /// Compensate a `sign_and_advance` whose artifact could not be
    /// durably recorded: restore the previous head, but only while the
    /// failed operation is still the chain tip. Without this, the chain
    /// would advance over an event no reader of the log can account for.
    pub fn rescind(&self, link: &ChainLink) {
        let mut head = self.head.lock().unwrap_or_else(|e| e.into_inner());
        if *head == link.chain_hash {
            *head = link.previous_chain_hash.clone();
            debug!("Chain head rescinded to {}", *head);
        }
    }

    /// Read the current chain head without advancing it.
    pub fn current_chain_hash(&self) -> String {
        self.head
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The verification key. The only key material allowed outside the
    /// custodian boundary.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest::sha256_hex;
    use crate::crypto::keys::generate_keypair;

    #[test]
    fn test_head_starts_at_genesis() {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);
        assert_eq!(custodian.current_chain_hash(), genesis_hash());
    }

    #[test]
    fn test_sign_and_advance_links_chain() {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let first = custodian.sign_and_advance(&sha256_hex(b"event-1")).unwrap();
        assert_eq!(first.previous_chain_hash, genesis_hash());
        assert_eq!(
            first.chain_hash,
            chain_digest(&sha256_hex(b"event-1"), &genesis_hash()).unwrap()
        );
        assert_eq!(custodian.current_chain_hash(), first.chain_hash);

        let second = custodian.sign_and_advance(&sha256_hex(b"event-2")).unwrap();
        assert_eq!(second.previous_chain_hash, first.chain_hash);
        assert_eq!(custodian.current_chain_hash(), second.chain_hash);
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let (secret, public) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let digest = sha256_hex(b"event");
        let link = custodian.sign_and_advance(&digest).unwrap();

        let manager = SignatureManager::new();
        assert!(manager
            .verify_digest(&digest, &link.signature, &public)
            .unwrap());
    }

    #[test]
    fn test_resume_from_persisted_head() {
        let (secret, _) = generate_keypair();
        let head = sha256_hex(b"persisted-head");
        let custodian = ChainCustodian::with_head(secret, head.clone());

        assert_eq!(custodian.current_chain_hash(), head);
        let link = custodian.sign_and_advance(&sha256_hex(b"next")).unwrap();
        assert_eq!(link.previous_chain_hash, head);
    }

    #[test]
    fn test_rescind_restores_previous_head() {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let link = custodian.sign_and_advance(&sha256_hex(b"unlogged")).unwrap();
        custodian.rescind(&link);

        assert_eq!(custodian.current_chain_hash(), genesis_hash());

        // The chain continues as if the rescinded operation never ran.
        let next = custodian.sign_and_advance(&sha256_hex(b"next")).unwrap();
        assert_eq!(next.previous_chain_hash, genesis_hash());
    }

    #[test]
    fn test_rescind_ignores_stale_link() {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        let first = custodian.sign_and_advance(&sha256_hex(b"first")).unwrap();
        let second = custodian.sign_and_advance(&sha256_hex(b"second")).unwrap();

        // Only the chain tip can be rescinded.
        custodian.rescind(&first);
        assert_eq!(custodian.current_chain_hash(), second.chain_hash);
    }

    #[test]
    fn test_invalid_digest_does_not_advance() {
        let (secret, _) = generate_keypair();
        let custodian = ChainCustodian::new(secret);

        assert!(custodian.sign_and_advance("not-a-digest").is_err());
        assert_eq!(custodian.current_chain_hash(), genesis_hash());
    }
}
