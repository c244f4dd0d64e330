//! Cryptographic Primitives
//!
//! Content hashing, chain digests, keypair handling, and ECDSA
//! sign/verify used by the custodian, batch builder, and verifier.

pub mod digest;
pub mod keys;
pub mod signatures;

pub use digest::{chain_digest, genesis_hash, sha256_hex};
pub use keys::{load_or_generate_keypair, load_public_key};
pub use signatures::SignatureManager;
