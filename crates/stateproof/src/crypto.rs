//! Hash primitive shared by the store tree and the root tree

use std::str::FromStr;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Hash32, MalformedReason, Result};

pub const HASH_LENGTH: usize = 32;
pub const MAX_KEY_LENGTH: usize = u8::MAX as usize;
pub const MAX_VALUE_LENGTH: usize = u16::MAX as usize;

/// A 32-byte hash over byte strings, used at every tree level.
///
/// Implementations must be free of shared mutable state so one handle can be
/// used from any number of threads.
pub trait ProofHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> Hash32;

    /// node = H(left || right)
    fn hash_pair(&self, left: &Hash32, right: &Hash32) -> Hash32 {
        let mut data = [0u8; 2 * HASH_LENGTH];
        data[..HASH_LENGTH].copy_from_slice(left);
        data[HASH_LENGTH..].copy_from_slice(right);
        self.hash(&data)
    }

    /// leaf = H(encode(key, value))
    fn hash_kv(&self, key: &[u8], value: &[u8]) -> Result<Hash32> {
        Ok(self.hash(&encode_kv(key, value)?))
    }
}

/// keyLen(1) || key || valueLen(2, BE) || value
pub fn encode_kv(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let key_len = u8::try_from(key.len())
        .map_err(|_| MalformedReason::KeyTooLong { len: key.len() })?;
    let value_len = u16::try_from(value.len())
        .map_err(|_| MalformedReason::ValueTooLong { len: value.len() })?;

    let mut out = Vec::with_capacity(1 + key.len() + 2 + value.len());
    out.push(key_len);
    out.extend_from_slice(key);
    out.extend_from_slice(&value_len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(out)
}

/// BLAKE3, the platform's proof hash.
///
/// Only reachable through [`Blake3Hasher::init`], so nothing can hash
/// before the backend is ready.
#[derive(Debug)]
pub struct Blake3Hasher {
    _ready: (),
}

static BLAKE3: OnceLock<Blake3Hasher> = OnceLock::new();

impl Blake3Hasher {
    /// One-time backend setup. Idempotent; concurrent callers all get the
    /// same handle once it is ready.
    pub fn init() -> &'static Blake3Hasher {
        BLAKE3.get_or_init(|| {
            debug!("hasher: blake3 backend ready");
            Blake3Hasher { _ready: () }
        })
    }
}

impl ProofHasher for Blake3Hasher {
    fn hash(&self, data: &[u8]) -> Hash32 {
        // hasher state lives on this frame only
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// SHA-256 backend, for deployments that commit with it instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

static SHA256: Sha256Hasher = Sha256Hasher;

impl ProofHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Hash32 {
        Sha256::digest(data).into()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashBackend {
    #[default]
    Blake3,
    Sha256,
}

impl HashBackend {
    pub fn init(self) -> &'static dyn ProofHasher {
        match self {
            HashBackend::Blake3 => Blake3Hasher::init(),
            HashBackend::Sha256 => &SHA256,
        }
    }
}

impl FromStr for HashBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(HashBackend::Blake3),
            "sha256" | "sha-256" => Ok(HashBackend::Sha256),
            other => Err(format!("unknown hash backend: {other}")),
        }
    }
}
