//! Verifies query results against a trusted app hash

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{
    decode_root_tree_proof, key_outcomes, CollectionName, Hash32, KeyOutcomes, ProofBundle,
    ProofError, ProofHasher, Result, RootTreeShape, RootTreeVerifier, StoreTreeVerifier,
};

/// Outcomes for several collections proven by one bundle
pub type CollectionOutcomes = BTreeMap<CollectionName, KeyOutcomes>;

/// Answers "is this value at this key, in state committed to by this app
/// hash". Holds no mutable state; one verifier can serve many threads.
pub struct ProofVerifier<'h, H: ProofHasher + ?Sized> {
    hasher: &'h H,
    shape: RootTreeShape,
}

impl<'h, H: ProofHasher + ?Sized> ProofVerifier<'h, H> {
    pub fn new(hasher: &'h H, shape: RootTreeShape) -> Self {
        Self { hasher, shape }
    }

    /// Verify `keys` in one collection of `bundle`.
    ///
    /// The collection's store-tree root is recomputed, placed at the
    /// collection's leaf of the root tree and recombined with the bundle's
    /// root-tree proof. Outcomes are only returned when the result equals
    /// `trusted_app_hash`.
    pub fn verify<I, K>(
        &self,
        bundle: &ProofBundle,
        collection: CollectionName,
        keys: I,
        trusted_app_hash: Hash32,
    ) -> Result<KeyOutcomes>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut all = self.verify_collections(bundle, [(collection, keys)], trusted_app_hash)?;
        Ok(all.remove(&collection).unwrap_or_default())
    }

    /// Verify several collections whose store-tree roots are proven
    /// together by a single root-tree proof.
    pub fn verify_collections<Q, I, K>(
        &self,
        bundle: &ProofBundle,
        queries: Q,
        trusted_app_hash: Hash32,
    ) -> Result<CollectionOutcomes>
    where
        Q: IntoIterator<Item = (CollectionName, I)>,
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        // merge repeated collections so each leaf is proven once
        let mut requested: BTreeMap<CollectionName, Vec<Vec<u8>>> = BTreeMap::new();
        for (collection, keys) in queries {
            requested
                .entry(collection)
                .or_default()
                .extend(keys.into_iter().map(|k| k.as_ref().to_vec()));
        }

        let store = StoreTreeVerifier::new(self.hasher);
        let mut leaves = Vec::with_capacity(requested.len());
        let mut outcomes = CollectionOutcomes::new();

        for (collection, keys) in requested {
            let leaf_index = self
                .shape
                .leaf_index(collection)
                .ok_or(ProofError::CollectionNotInShape(collection))?;
            let proof = bundle
                .store_tree_proofs
                .get(&collection)
                .ok_or(ProofError::MissingStoreTreeProof(collection))?;

            let execution = store.execute(proof)?;
            debug!(
                %collection,
                leaf_index,
                root = %hex::encode(execution.root_hash),
                "facade: store tree executed"
            );
            leaves.push((leaf_index, execution.root_hash));
            outcomes.insert(collection, key_outcomes(&execution, keys));
        }

        let root_proof = decode_root_tree_proof(&bundle.root_tree_proof)?;
        RootTreeVerifier::new(self.hasher, &self.shape).verify_against(
            &leaves,
            &root_proof,
            trusted_app_hash,
        )?;

        info!(
            collections = outcomes.len(),
            app_hash = %hex::encode(trusted_app_hash),
            "facade: proofs verified"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode_root_tree_proof, encode_store_tree_proof, Blake3Hasher, ProofOperation, RootTree,
        VerificationOutcome,
    };

    fn platform_verifier() -> ProofVerifier<'static, Blake3Hasher> {
        ProofVerifier::new(Blake3Hasher::init(), RootTreeShape::platform())
    }

    fn single_entry_proof(key: &[u8], value: &[u8]) -> Vec<u8> {
        encode_store_tree_proof(&[ProofOperation::KeyValueEntry {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
        .unwrap()
    }

    /// Bundle proving `collection`, plus the app hash it commits to.
    fn bundle_for(collection: CollectionName, store_proof: Vec<u8>) -> (ProofBundle, Hash32) {
        let hasher = Blake3Hasher::init();
        let shape = RootTreeShape::platform();
        let index = shape.leaf_index(collection).unwrap();
        let root = StoreTreeVerifier::new(hasher)
            .execute(&store_proof)
            .unwrap()
            .root_hash;

        let mut leaves: Vec<Hash32> = (0..6u8).map(|i| hasher.hash(&[0xee, i])).collect();
        leaves[index] = root;
        let tree = RootTree::from_leaves(hasher, leaves).unwrap();

        let mut bundle = ProofBundle {
            root_tree_proof: encode_root_tree_proof(&tree.proof(&[index]).unwrap()),
            ..Default::default()
        };
        bundle.store_tree_proofs.insert(collection, store_proof);
        (bundle, tree.root())
    }

    #[test]
    fn test_verify_present() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"name", b"\x65alice");
        let (bundle, app_hash) = bundle_for(CollectionName::Documents, proof);

        let outcomes = verifier
            .verify(&bundle, CollectionName::Documents, [b"name"], app_hash)
            .unwrap();
        assert_eq!(
            outcomes[b"name".as_slice()],
            VerificationOutcome::Present(b"\x65alice".to_vec())
        );
    }

    #[test]
    fn test_wrong_app_hash() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"id", b"\x01");
        let (bundle, mut app_hash) = bundle_for(CollectionName::Identities, proof);
        app_hash[31] ^= 0xff;

        let err = verifier
            .verify(&bundle, CollectionName::Identities, [b"id"], app_hash)
            .unwrap_err();
        assert!(matches!(err, ProofError::AppHashMismatch { .. }));
        assert!(err.is_cryptographic());
    }

    #[test]
    fn test_collection_at_wrong_leaf_fails() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"c", b"\x02");
        let (mut bundle, app_hash) = bundle_for(CollectionName::DataContracts, proof);
        // same proof presented as another collection
        let proof = bundle
            .store_tree_proofs
            .remove(&CollectionName::DataContracts)
            .unwrap();
        bundle.store_tree_proofs.insert(CollectionName::Documents, proof);

        assert!(verifier
            .verify(&bundle, CollectionName::Documents, [b"c"], app_hash)
            .is_err());
    }

    #[test]
    fn test_missing_store_tree_proof() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"k", b"\x00");
        let (bundle, app_hash) = bundle_for(CollectionName::Documents, proof);
        assert_eq!(
            verifier.verify(&bundle, CollectionName::Identities, [b"k"], app_hash),
            Err(ProofError::MissingStoreTreeProof(CollectionName::Identities))
        );
    }

    #[test]
    fn test_collection_outside_shape() {
        let shape = RootTreeShape::new(2, [(CollectionName::Identities, 0)]).unwrap();
        let verifier = ProofVerifier::new(Blake3Hasher::init(), shape);
        let bundle = ProofBundle::default();
        assert_eq!(
            verifier.verify(&bundle, CollectionName::Documents, [b"k"], [0u8; 32]),
            Err(ProofError::CollectionNotInShape(CollectionName::Documents))
        );
    }

    #[test]
    fn test_repeated_collection_is_merged() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"m", b"\x03");
        let (bundle, app_hash) = bundle_for(CollectionName::Documents, proof);

        let outcomes = verifier
            .verify_collections(
                &bundle,
                [
                    (CollectionName::Documents, vec![b"m".to_vec()]),
                    (CollectionName::Documents, vec![b"a".to_vec()]),
                ],
                app_hash,
            )
            .unwrap();
        let docs = &outcomes[&CollectionName::Documents];
        assert!(docs[b"m".as_slice()].is_present());
        assert_eq!(docs[b"a".as_slice()], VerificationOutcome::Absent);
    }

    #[test]
    fn test_shared_verifier_across_threads() {
        let verifier = platform_verifier();
        let proof = single_entry_proof(b"name", b"\x65alice");
        let (bundle, app_hash) = bundle_for(CollectionName::Documents, proof);
        let mut wrong_hash = app_hash;
        wrong_hash[0] ^= 0x01;

        let keys = [b"name".as_slice(), b"zzz".as_slice()];
        let expected = verifier.verify(&bundle, CollectionName::Documents, keys, app_hash);
        let expected_err = verifier.verify(&bundle, CollectionName::Documents, keys, wrong_hash);
        assert!(expected.is_ok());
        assert!(expected_err.is_err());

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let trusted = if i % 2 == 0 { app_hash } else { wrong_hash };
                    let (verifier, bundle) = (&verifier, &bundle);
                    s.spawn(move || {
                        let got = verifier.verify(bundle, CollectionName::Documents, keys, trusted);
                        (i, got)
                    })
                })
                .collect();

            for handle in handles {
                let (i, got) = handle.join().unwrap();
                if i % 2 == 0 {
                    assert_eq!(got, expected, "thread {i}");
                } else {
                    assert_eq!(got, expected_err, "thread {i}");
                }
            }
        });
    }
}
