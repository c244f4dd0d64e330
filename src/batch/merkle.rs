//! Merkle Tree over Event Hashes
//!
//! Binary tree built bottom-up from a batch's ordered event hashes:
//! `parent = sha256(raw(left) || raw(right))` over raw digest bytes. An
//! unpaired node at any level is promoted to the next level unchanged
//! (never duplicated), so a single-leaf batch's root is the leaf itself
//! and the well-known duplicate-leaf ambiguity cannot arise.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::crypto::digest::decode_digest;
use crate::error::ArchiveError;

/// Which side of the concatenation a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Path from a leaf to the root. Levels where the leaf's ancestor was
/// promoted contribute no step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub steps: Vec<ProofStep>,
    pub root_hash: String,
}

impl MerkleProof {
    /// Recompute the path and compare against the expected root.
    pub fn verify(&self) -> Result<bool, ArchiveError> {
        let mut current = decode_digest(&self.leaf_hash)?;

        for step in &self.steps {
            let sibling = decode_digest(&step.sibling)?;
            let mut hasher = Sha256::new();
            match step.side {
                Side::Left => {
                    hasher.update(&sibling);
                    hasher.update(&current);
                }
                Side::Right => {
                    hasher.update(&current);
                    hasher.update(&sibling);
                }
            }
            current = hasher.finalize().to_vec();
        }

        Ok(hex::encode(current) == self.root_hash)
    }
}

fn parent_hash(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

fn decode_leaves(leaves: &[String]) -> Result<Vec<Vec<u8>>, ArchiveError> {
    if leaves.is_empty() {
        return Err(ArchiveError::BatchError(
            "Cannot build Merkle tree from empty leaf set".to_string(),
        ));
    }
    leaves.iter().map(|l| decode_digest(l)).collect()
}

/// Compute the Merkle root of an ordered, non-empty list of hex digests.
pub fn merkle_root(leaves: &[String]) -> Result<String, ArchiveError> {
    let mut level = decode_leaves(leaves)?;

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut pairs = level.chunks_exact(2);
        for pair in &mut pairs {
            next.push(parent_hash(&pair[0], &pair[1]));
        }
        if let [last] = pairs.remainder() {
            // Odd node count: promote the unpaired node unchanged.
            next.push(last.clone());
        }
        level = next;
    }

    let root = hex::encode(&level[0]);
    debug!("Merkle root over {} leaves: {}", leaves.len(), root);
    Ok(root)
}

/// Generate the inclusion proof for the leaf at `index`.
pub fn generate_proof(leaves: &[String], index: usize) -> Result<MerkleProof, ArchiveError> {
    if index >= leaves.len() {
        return Err(ArchiveError::BatchError(format!(
            "Leaf index {} out of range for {} leaves",
            index,
            leaves.len()
        )));
    }

    let mut level = decode_leaves(leaves)?;
    let mut position = index;
    let mut steps = Vec::new();

    while level.len() > 1 {
        let paired_end = level.len() - level.len() % 2;
        if position < paired_end {
            let (sibling_pos, side) = if position % 2 == 0 {
                (position + 1, Side::Right)
            } else {
                (position - 1, Side::Left)
            };
            steps.push(ProofStep {
                sibling: hex::encode(&level[sibling_pos]),
                side,
            });
            position /= 2;
        } else {
            // Promoted node: it moves to the end of the next level with
            // no sibling at this level.
            position = level.len() / 2;
        }

        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut pairs = level.chunks_exact(2);
        for pair in &mut pairs {
            next.push(parent_hash(&pair[0], &pair[1]));
        }
        if let [last] = pairs.remainder() {
            next.push(last.clone());
        }
        level = next;
    }

    Ok(MerkleProof {
        leaf_hash: leaves[index].clone(),
        steps,
        root_hash: hex::encode(&level[0]),
    })
}
