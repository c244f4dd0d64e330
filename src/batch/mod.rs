//! Batch Building and Merkle Commitment

pub mod builder;
pub mod merkle;

pub use builder::{Batch, BatchBuilder, BatchHeader, BatchStore};
pub use merkle::{generate_proof, merkle_root, MerkleProof};
