//! Verification of platform state proofs
//!
//! A platform query answered with proofs carries a [`ProofBundle`]: one
//! store-tree proof per collection plus a root-tree proof tying every
//! collection root to the platform-wide app hash. This crate decodes both
//! binary formats, replays the store-tree operation stream to recompute the
//! collection root, and recombines that root with the root-tree siblings so
//! it can be compared against a trusted app hash.

mod codec;
mod crypto;
mod executor;
mod facade;
mod root_tree;
mod store_tree;
mod types;
mod value;
mod verifier;

pub use crypto::{
    encode_kv, Blake3Hasher, HashBackend, ProofHasher, Sha256Hasher, HASH_LENGTH, MAX_KEY_LENGTH,
    MAX_VALUE_LENGTH,
};
pub use executor::execute;
pub use facade::{CollectionOutcomes, ProofVerifier};
pub use root_tree::{
    decode_root_tree_proof, encode_root_tree_proof, RootTree, RootTreeShape, RootTreeVerifier,
};
pub use store_tree::{
    decode_store_tree_proof, encode_store_tree_proof, StoreTreeSummary, TAG_CHILD, TAG_HASH,
    TAG_KEY_VALUE, TAG_KEY_VALUE_HASH, TAG_PARENT,
};
pub use types::{
    CollectionName, ExecutionResult, Hash32, InvalidReason, KeyOutcomes, ProofBundle, ProofLeaf,
    ProofOperation, RootTreeSiblingProof, VerificationOutcome,
};
pub use value::decode_value;
pub use verifier::{key_outcomes, StoreTreeVerifier};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("Truncated proof: need {needed} bytes at offset {offset}, {available} available")]
    TruncatedProof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unknown operation tag 0x{tag:02x} at offset {offset}")]
    UnknownOperationTag { tag: u8, offset: usize },

    #[error("Empty proof")]
    EmptyProof,

    #[error("Incomplete proof: {remaining} entries left on the stack")]
    IncompleteProof { remaining: usize },

    #[error("Malformed proof: {0}")]
    MalformedProof(#[from] MalformedReason),

    #[error("Root mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    RootMismatch { expected: Hash32, actual: Hash32 },

    #[error("App hash mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    AppHashMismatch { expected: Hash32, actual: Hash32 },

    #[error("No store-tree proof for collection {0}")]
    MissingStoreTreeProof(CollectionName),

    #[error("Collection {0} has no leaf in the root tree")]
    CollectionNotInShape(CollectionName),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ProofError {
    /// True for failures of the hash comparison itself, as opposed to
    /// structurally broken input.
    pub fn is_cryptographic(&self) -> bool {
        matches!(
            self,
            ProofError::RootMismatch { .. } | ProofError::AppHashMismatch { .. }
        )
    }
}

/// Structural violations found while decoding or replaying a proof.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    #[error("stack underflow at operation {op_index}")]
    StackUnderflow { op_index: usize },

    #[error("disclosed keys out of order at operation {op_index}")]
    KeyOrder { op_index: usize },

    #[error("key of {len} bytes exceeds 255")]
    KeyTooLong { len: usize },

    #[error("value of {len} bytes exceeds 65535")]
    ValueTooLong { len: usize },

    #[error("missing sibling hash at level {level}")]
    MissingSibling { level: usize },

    #[error("{count} unused sibling hashes")]
    UnusedSiblings { count: usize },

    #[error("{count} trailing bytes after root-tree proof")]
    TrailingBytes { count: usize },

    #[error("proof declares {declared} leaves, shape has {expected}")]
    LeafCountMismatch { declared: u32, expected: usize },

    #[error("leaf index {index} out of range for {leaf_count} leaves")]
    LeafIndexOutOfRange { index: usize, leaf_count: usize },

    #[error("leaf index {index} given more than once")]
    DuplicateLeaf { index: usize },

    #[error("no leaves to prove")]
    NoLeaves,
}

pub type Result<T> = std::result::Result<T, ProofError>;
