//! Core types for proof verification

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::decode_value;
use crate::Result;

/// 32-byte hash
pub type Hash32 = [u8; 32];

/// Per-key verification results, ordered by key
pub type KeyOutcomes = BTreeMap<Vec<u8>, VerificationOutcome>;

/// Platform subtrees that can be queried with proofs
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionName {
    Identities,
    PublicKeyHashes,
    DataContracts,
    Documents,
}

impl CollectionName {
    pub const ALL: [CollectionName; 4] = [
        CollectionName::Identities,
        CollectionName::PublicKeyHashes,
        CollectionName::DataContracts,
        CollectionName::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Identities => "identities",
            CollectionName::PublicKeyHashes => "publicKeyHashes",
            CollectionName::DataContracts => "dataContracts",
            CollectionName::Documents => "documents",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CollectionName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// Proofs returned alongside a platform query response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    #[serde(with = "hex")]
    pub root_tree_proof: Vec<u8>,
    #[serde(with = "hex_map")]
    pub store_tree_proofs: BTreeMap<CollectionName, Vec<u8>>,
    #[serde(with = "hex", default)]
    pub signature: Vec<u8>,
    #[serde(with = "hex", default)]
    pub signature_quorum_hash: Vec<u8>,
}

/// One decoded store-tree proof instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofOperation {
    /// Hash of an undisclosed subtree
    Hash(Hash32),
    /// Hash standing in for a single undisclosed key/value pair
    KeyValueHash(Hash32),
    /// Disclosed pair; `value` is the raw CBOR payload
    KeyValueEntry { key: Vec<u8>, value: Vec<u8> },
    Parent,
    Child,
}

/// A leaf of the reconstructed store tree, left to right
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofLeaf {
    Hash(Hash32),
    KeyValueHash(Hash32),
    /// Index into [`ExecutionResult::disclosed_entries`]
    Entry(usize),
}

/// Result of replaying a store-tree proof
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub root_hash: Hash32,
    /// Disclosed pairs in stream order
    pub disclosed_entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Leaves in left-to-right tree order
    pub leaves: Vec<ProofLeaf>,
}

impl ExecutionResult {
    /// Disclosed pairs in tree order, which is ascending key order.
    pub fn entries_in_order(&self) -> impl Iterator<Item = &(Vec<u8>, Vec<u8>)> + '_ {
        self.leaves.iter().filter_map(|leaf| match leaf {
            ProofLeaf::Entry(i) => self.disclosed_entries.get(*i),
            _ => None,
        })
    }
}

/// Decoded root-tree proof buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootTreeSiblingProof {
    /// Leaf count recorded by the producer (informational)
    pub total_leaves: u32,
    pub sibling_hashes: Vec<Hash32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    KeyNotBracketed,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::KeyNotBracketed => f.write_str("key not bracketed"),
        }
    }
}

/// What a proof says about one queried key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Key is included; holds the disclosed value bytes unchanged
    Present(Vec<u8>),
    /// Key is provably not in the collection
    Absent,
    /// Proof neither includes nor excludes the key
    Invalid(InvalidReason),
}

impl VerificationOutcome {
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            VerificationOutcome::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Decode a present value from CBOR.
    pub fn decoded(&self) -> Option<Result<ciborium::Value>> {
        self.value().map(decode_value)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, VerificationOutcome::Present(_))
    }
}

/// Store-tree proofs keyed by collection name, hex-encoded in text formats.
mod hex_map {
    use std::collections::BTreeMap;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::CollectionName;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<CollectionName, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(name, bytes)| (name.as_str(), hex::encode(bytes)))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<CollectionName, Vec<u8>>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, bytes)| {
                let name = name.parse::<CollectionName>().map_err(D::Error::custom)?;
                let bytes = hex::decode(bytes).map_err(D::Error::custom)?;
                Ok::<_, D::Error>((name, bytes))
            })
            .collect()
    }
}
