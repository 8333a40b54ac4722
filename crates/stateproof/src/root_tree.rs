//! Root tree: a small fixed binary Merkle tree over collection roots whose
//! root is the platform app hash.
//!
//! Leaves sit at fixed indices. A level with an odd number of nodes carries
//! its last node up unchanged, so a 6-leaf tree has depth 3 (as if padded to
//! 8 with empty slots) and a proof only holds siblings that exist.
//!
//! Proof buffer: `totalLeaves(u32 LE) || count(compact varint) || count × 32B`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::codec::{write_varint, ByteReader};
use crate::{
    CollectionName, Hash32, MalformedReason, ProofError, ProofHasher, Result,
    RootTreeSiblingProof, HASH_LENGTH,
};

/// Leaf layout of the root tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootTreeShape {
    leaf_count: usize,
    leaves: BTreeMap<CollectionName, usize>,
}

impl RootTreeShape {
    /// Build a shape; every leaf index must be below `leaf_count`.
    pub fn new(
        leaf_count: usize,
        leaves: impl IntoIterator<Item = (CollectionName, usize)>,
    ) -> Result<Self> {
        let leaves: BTreeMap<_, _> = leaves.into_iter().collect();
        if leaf_count == 0 {
            return Err(MalformedReason::NoLeaves.into());
        }
        if let Some(&index) = leaves.values().find(|&&i| i >= leaf_count) {
            return Err(MalformedReason::LeafIndexOutOfRange { index, leaf_count }.into());
        }
        Ok(Self { leaf_count, leaves })
    }

    /// The platform's six-leaf tree. Leaves 0 and 5 hold subtrees this
    /// crate does not query.
    pub fn platform() -> Self {
        Self {
            leaf_count: 6,
            leaves: BTreeMap::from([
                (CollectionName::Identities, 1),
                (CollectionName::PublicKeyHashes, 2),
                (CollectionName::DataContracts, 3),
                (CollectionName::Documents, 4),
            ]),
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// ceil(log2(leaf_count))
    pub fn depth(&self) -> usize {
        self.leaf_count.next_power_of_two().trailing_zeros() as usize
    }

    pub fn leaf_index(&self, collection: CollectionName) -> Option<usize> {
        self.leaves.get(&collection).copied()
    }
}

impl Default for RootTreeShape {
    fn default() -> Self {
        Self::platform()
    }
}

pub fn decode_root_tree_proof(bytes: &[u8]) -> Result<RootTreeSiblingProof> {
    let mut reader = ByteReader::new(bytes);
    let total_leaves = reader.read_u32_le()?;
    let count = reader.read_varint()?;

    // check the whole hash list fits before allocating for it
    let available = reader.remaining();
    let needed = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(HASH_LENGTH))
        .unwrap_or(usize::MAX);
    if needed > available {
        return Err(ProofError::TruncatedProof {
            offset: reader.offset(),
            needed,
            available,
        });
    }

    let mut sibling_hashes = Vec::with_capacity(needed / HASH_LENGTH);
    for _ in 0..needed / HASH_LENGTH {
        sibling_hashes.push(reader.read_hash()?);
    }
    if !reader.is_empty() {
        let count = reader.remaining();
        return Err(MalformedReason::TrailingBytes { count }.into());
    }

    debug!(
        total_leaves,
        siblings = sibling_hashes.len(),
        "root_tree: decoded"
    );
    Ok(RootTreeSiblingProof {
        total_leaves,
        sibling_hashes,
    })
}

pub fn encode_root_tree_proof(proof: &RootTreeSiblingProof) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 9 + proof.sibling_hashes.len() * HASH_LENGTH);
    out.extend_from_slice(&proof.total_leaves.to_le_bytes());
    write_varint(&mut out, proof.sibling_hashes.len() as u64);
    for hash in &proof.sibling_hashes {
        out.extend_from_slice(hash);
    }
    out
}

/// Recombines known leaves with proof siblings into the tree root.
pub struct RootTreeVerifier<'h, H: ProofHasher + ?Sized> {
    hasher: &'h H,
    leaf_count: usize,
    depth: usize,
}

impl<'h, H: ProofHasher + ?Sized> RootTreeVerifier<'h, H> {
    pub fn new(hasher: &'h H, shape: &RootTreeShape) -> Self {
        Self {
            hasher,
            leaf_count: shape.leaf_count(),
            depth: shape.depth(),
        }
    }

    /// Root implied by one leaf and its sibling path.
    ///
    /// At each level the running hash is the left input when the index bit
    /// is 0 and the right input when it is 1.
    pub fn verify(
        &self,
        leaf_index: usize,
        leaf_hash: Hash32,
        proof: &RootTreeSiblingProof,
    ) -> Result<Hash32> {
        self.calculate_root(&[(leaf_index, leaf_hash)], proof)
    }

    /// Root implied by several known leaves sharing one proof.
    ///
    /// Levels are processed bottom-up and, within a level, by ascending
    /// index. A sibling hash is taken from the proof only when the
    /// neighbour is neither known nor an empty slot. The proof must declare
    /// the shape's leaf count.
    pub fn calculate_root(
        &self,
        leaves: &[(usize, Hash32)],
        proof: &RootTreeSiblingProof,
    ) -> Result<Hash32> {
        let mut known = self.known_leaves(leaves)?;
        if proof.total_leaves as usize != self.leaf_count {
            return Err(MalformedReason::LeafCountMismatch {
                declared: proof.total_leaves,
                expected: self.leaf_count,
            }
            .into());
        }

        let mut siblings = proof.sibling_hashes.iter();
        let mut width = self.leaf_count;

        for level in 0..self.depth {
            let mut parents = BTreeMap::new();
            for (&index, &hash) in &known {
                let parent = index / 2;
                if parents.contains_key(&parent) {
                    continue;
                }
                let pair = index ^ 1;
                let combined = if pair >= width {
                    hash
                } else {
                    let other = match known.get(&pair) {
                        Some(h) => *h,
                        None => *siblings
                            .next()
                            .ok_or(MalformedReason::MissingSibling { level })?,
                    };
                    if index & 1 == 0 {
                        self.hasher.hash_pair(&hash, &other)
                    } else {
                        self.hasher.hash_pair(&other, &hash)
                    }
                };
                trace!(level, index, "root_tree: combined");
                parents.insert(parent, combined);
            }
            known = parents;
            width = width.div_ceil(2);
        }

        let unused = siblings.count();
        if unused > 0 {
            return Err(MalformedReason::UnusedSiblings { count: unused }.into());
        }
        known
            .get(&0)
            .copied()
            .ok_or_else(|| MalformedReason::NoLeaves.into())
    }

    /// Recombine and compare against a trusted app hash.
    pub fn verify_against(
        &self,
        leaves: &[(usize, Hash32)],
        proof: &RootTreeSiblingProof,
        trusted: Hash32,
    ) -> Result<Hash32> {
        let root = self.calculate_root(leaves, proof)?;
        if root != trusted {
            warn!(
                expected = %hex::encode(trusted),
                actual = %hex::encode(root),
                "root_tree: app hash mismatch"
            );
            return Err(ProofError::AppHashMismatch {
                expected: trusted,
                actual: root,
            });
        }
        Ok(root)
    }

    fn known_leaves(&self, leaves: &[(usize, Hash32)]) -> Result<BTreeMap<usize, Hash32>> {
        if leaves.is_empty() {
            return Err(MalformedReason::NoLeaves.into());
        }
        let mut known = BTreeMap::new();
        for &(index, hash) in leaves {
            if index >= self.leaf_count {
                return Err(MalformedReason::LeafIndexOutOfRange {
                    index,
                    leaf_count: self.leaf_count,
                }
                .into());
            }
            if known.insert(index, hash).is_some() {
                return Err(MalformedReason::DuplicateLeaf { index }.into());
            }
        }
        Ok(known)
    }
}

/// Fully materialised root tree, built from every leaf hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootTree {
    /// Leaves at index 0, root alone in the last layer
    layers: Vec<Vec<Hash32>>,
}

impl RootTree {
    pub fn from_leaves<H: ProofHasher + ?Sized>(hasher: &H, leaves: Vec<Hash32>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(MalformedReason::NoLeaves.into());
        }
        let mut layers = vec![leaves];
        while let Some(current) = layers.last().filter(|l| l.len() > 1) {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hasher.hash_pair(left, right),
                    _ => pair[0],
                })
                .collect();
            layers.push(next);
        }
        Ok(Self { layers })
    }

    pub fn root(&self) -> Hash32 {
        // from_leaves guarantees a non-empty last layer
        self.layers[self.layers.len() - 1][0]
    }

    pub fn layers(&self) -> &[Vec<Hash32>] {
        &self.layers
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Sibling proof for the given leaf indices, in the order
    /// [`RootTreeVerifier::calculate_root`] consumes them.
    pub fn proof(&self, indices: &[usize]) -> Result<RootTreeSiblingProof> {
        let leaf_count = self.leaf_count();
        let mut known = BTreeSet::new();
        for &index in indices {
            if index >= leaf_count {
                return Err(MalformedReason::LeafIndexOutOfRange { index, leaf_count }.into());
            }
            known.insert(index);
        }
        if known.is_empty() {
            return Err(MalformedReason::NoLeaves.into());
        }

        let mut sibling_hashes = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            for &index in &known {
                let pair = index ^ 1;
                if pair < layer.len() && !known.contains(&pair) {
                    sibling_hashes.push(layer[pair]);
                }
            }
            known = known.iter().map(|i| i / 2).collect();
        }

        Ok(RootTreeSiblingProof {
            total_leaves: leaf_count as u32,
            sibling_hashes,
        })
    }
}
