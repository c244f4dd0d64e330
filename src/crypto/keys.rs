//! Key Material Handling
//!
//! Generates and persists the archive's single signing keypair. The
//! private key file is only ever read by the chain custodian at startup;
//! verifiers get the public key file.

use std::fs;
use std::path::{Path, PathBuf};

use secp256k1::rand::rngs::OsRng;
use secp256k1::{PublicKey, SecretKey};
use tracing::info;

use crate::crypto::signatures::SignatureManager;
use crate::error::ArchiveError;

const PRIVATE_KEY_FILE: &str = "private.key";
const PUBLIC_KEY_FILE: &str = "public.key";

/// Load the archive keypair from `key_dir`, generating and persisting a
/// fresh one if no private key file exists.
pub fn load_or_generate_keypair(key_dir: &Path) -> Result<(SecretKey, PublicKey), ArchiveError> {
    fs::create_dir_all(key_dir)
        .map_err(|e| ArchiveError::CryptoError(format!("Failed to create key directory: {}", e)))?;

    let private_path = key_dir.join(PRIVATE_KEY_FILE);
    if private_path.exists() {
        load_keypair(key_dir)
    } else {
        let pair = generate_keypair();
        save_keypair(key_dir, &pair.0, &pair.1)?;
        info!("Generated new archive keypair in {}", key_dir.display());
        Ok(pair)
    }
}

/// Generate a fresh secp256k1 keypair.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let manager = SignatureManager::new();
    let mut rng = OsRng;
    let secret_key = SecretKey::new(&mut rng);
    let public_key = manager.public_key_from_secret(&secret_key);
    (secret_key, public_key)
}

/// Persist both halves of the keypair as hex files.
pub fn save_keypair(
    key_dir: &Path,
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> Result<(), ArchiveError> {
    fs::write(
        key_dir.join(PRIVATE_KEY_FILE),
        hex::encode(secret_key.secret_bytes()),
    )
    .map_err(|e| ArchiveError::CryptoError(format!("Failed to write private key: {}", e)))?;

    fs::write(key_dir.join(PUBLIC_KEY_FILE), hex::encode(public_key.serialize()))
        .map_err(|e| ArchiveError::CryptoError(format!("Failed to write public key: {}", e)))?;

    Ok(())
}

/// Load a previously persisted keypair.
pub fn load_keypair(key_dir: &Path) -> Result<(SecretKey, PublicKey), ArchiveError> {
    let secret_hex = fs::read_to_string(key_dir.join(PRIVATE_KEY_FILE))
        .map_err(|e| ArchiveError::CryptoError(format!("Failed to read private key: {}", e)))?;
    let secret_bytes = hex::decode(secret_hex.trim())
        .map_err(|e| ArchiveError::CryptoError(format!("Invalid private key hex: {}", e)))?;
    let secret_key = SecretKey::from_slice(&secret_bytes)
        .map_err(|e| ArchiveError::CryptoError(format!("Invalid private key: {}", e)))?;

    let public_key = SignatureManager::new().public_key_from_secret(&secret_key);
    Ok((secret_key, public_key))
}

/// Load only the public key, for verifiers that must not see the private
/// half.
pub fn load_public_key(key_dir: &Path) -> Result<PublicKey, ArchiveError> {
    let public_hex = fs::read_to_string(key_dir.join(PUBLIC_KEY_FILE))
        .map_err(|e| ArchiveError::CryptoError(format!("Failed to read public key: {}", e)))?;
    let public_bytes = hex::decode(public_hex.trim())
        .map_err(|e| ArchiveError::CryptoError(format!("Invalid public key hex: {}", e)))?;
    PublicKey::from_slice(&public_bytes)
        .map_err(|e| ArchiveError::CryptoError(format!("Invalid public key: {}", e)))
}

/// Path to the public key file within a key directory.
pub fn public_key_path(key_dir: &Path) -> PathBuf {
    key_dir.join(PUBLIC_KEY_FILE)
}
