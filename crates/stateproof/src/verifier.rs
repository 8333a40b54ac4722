//! Inclusion and non-inclusion of queried keys in one store tree

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::{
    decode_store_tree_proof, execute, ExecutionResult, Hash32, InvalidReason, KeyOutcomes,
    ProofError, ProofHasher, ProofLeaf, Result, VerificationOutcome,
};

pub struct StoreTreeVerifier<'h, H: ProofHasher + ?Sized> {
    hasher: &'h H,
}

impl<'h, H: ProofHasher + ?Sized> StoreTreeVerifier<'h, H> {
    pub fn new(hasher: &'h H) -> Self {
        Self { hasher }
    }

    /// Decode and replay a proof buffer.
    pub fn execute(&self, proof: &[u8]) -> Result<ExecutionResult> {
        execute(self.hasher, &decode_store_tree_proof(proof)?)
    }

    /// Check `proof` against `expected_root` and resolve every queried key.
    pub fn verify<I, K>(&self, proof: &[u8], keys: I, expected_root: Hash32) -> Result<KeyOutcomes>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let result = self.execute(proof)?;
        if result.root_hash != expected_root {
            warn!(
                expected = %hex::encode(expected_root),
                actual = %hex::encode(result.root_hash),
                "store_tree: root mismatch"
            );
            return Err(ProofError::RootMismatch {
                expected: expected_root,
                actual: result.root_hash,
            });
        }
        Ok(key_outcomes(&result, keys))
    }
}

/// Resolve queried keys against an executed proof. The caller is
/// responsible for authenticating `result.root_hash`.
pub fn key_outcomes<I, K>(result: &ExecutionResult, keys: I) -> KeyOutcomes
where
    I: IntoIterator<Item = K>,
    K: AsRef<[u8]>,
{
    let outcomes: KeyOutcomes = keys
        .into_iter()
        .map(|k| {
            let key = k.as_ref();
            (key.to_vec(), outcome_for(result, key))
        })
        .collect();

    debug!(
        queried = outcomes.len(),
        present = outcomes.values().filter(|o| o.is_present()).count(),
        "store_tree: keys resolved"
    );
    outcomes
}

/// A missing key is absent only when the leaves on either side of its
/// sorted position are disclosed entries or the edge of the tree. An
/// opaque leaf there could be hiding the key.
fn outcome_for(result: &ExecutionResult, key: &[u8]) -> VerificationOutcome {
    let mut lower: Option<usize> = None;
    let mut upper: Option<usize> = None;

    for (pos, leaf) in result.leaves.iter().enumerate() {
        let ProofLeaf::Entry(i) = leaf else { continue };
        let (entry_key, value) = &result.disclosed_entries[*i];
        match entry_key.as_slice().cmp(key) {
            Ordering::Equal => return VerificationOutcome::Present(value.clone()),
            Ordering::Less => lower = Some(pos),
            Ordering::Greater => {
                upper = Some(pos);
                break;
            }
        }
    }

    let gap_start = lower.map_or(0, |pos| pos + 1);
    let gap_end = upper.unwrap_or(result.leaves.len());
    if gap_start == gap_end {
        VerificationOutcome::Absent
    } else {
        VerificationOutcome::Invalid(InvalidReason::KeyNotBracketed)
    }
}
