//! Store-tree proof stream: `tag(1) || payload`, repeated to the end of
//! the buffer.
//!
//! | tag    | operation      | payload                                      |
//! |--------|----------------|----------------------------------------------|
//! | `0x01` | `Hash`         | 32-byte hash                                 |
//! | `0x02` | `KeyValueHash` | 32-byte hash                                 |
//! | `0x03` | `KeyValueEntry`| `keyLen(1) key valueLen(2, BE) value`        |
//! | `0x10` | `Parent`       | none                                         |
//! | `0x11` | `Child`        | none                                         |

use tracing::debug;

use crate::codec::ByteReader;
use crate::{decode_value, encode_kv, Hash32, ProofError, ProofOperation, Result};

pub const TAG_HASH: u8 = 0x01;
pub const TAG_KEY_VALUE_HASH: u8 = 0x02;
pub const TAG_KEY_VALUE: u8 = 0x03;
pub const TAG_PARENT: u8 = 0x10;
pub const TAG_CHILD: u8 = 0x11;

/// Decode a whole store-tree proof. An empty buffer decodes to no
/// operations; rejecting it is left to execution.
pub fn decode_store_tree_proof(bytes: &[u8]) -> Result<Vec<ProofOperation>> {
    let mut reader = ByteReader::new(bytes);
    let mut ops = Vec::new();

    while !reader.is_empty() {
        let offset = reader.offset();
        let op = match reader.read_u8()? {
            TAG_HASH => ProofOperation::Hash(reader.read_hash()?),
            TAG_KEY_VALUE_HASH => ProofOperation::KeyValueHash(reader.read_hash()?),
            TAG_KEY_VALUE => {
                let key_len = reader.read_u8()? as usize;
                let key = reader.take(key_len)?.to_vec();
                let value_len = reader.read_u16_be()? as usize;
                let value = reader.take(value_len)?.to_vec();
                ProofOperation::KeyValueEntry { key, value }
            }
            TAG_PARENT => ProofOperation::Parent,
            TAG_CHILD => ProofOperation::Child,
            tag => return Err(ProofError::UnknownOperationTag { tag, offset }),
        };
        ops.push(op);
    }

    debug!(bytes = bytes.len(), ops = ops.len(), "store_tree: decoded");
    Ok(ops)
}

/// Write operations in the wire format read by [`decode_store_tree_proof`].
pub fn encode_store_tree_proof(ops: &[ProofOperation]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for op in ops {
        match op {
            ProofOperation::Hash(h) => {
                out.push(TAG_HASH);
                out.extend_from_slice(h);
            }
            ProofOperation::KeyValueHash(h) => {
                out.push(TAG_KEY_VALUE_HASH);
                out.extend_from_slice(h);
            }
            ProofOperation::KeyValueEntry { key, value } => {
                out.push(TAG_KEY_VALUE);
                out.extend_from_slice(&encode_kv(key, value)?);
            }
            ProofOperation::Parent => out.push(TAG_PARENT),
            ProofOperation::Child => out.push(TAG_CHILD),
        }
    }
    Ok(out)
}

/// Flat view of a proof's contents, without replaying it.
///
/// Nothing here is authenticated; use the verifier before trusting any
/// of these values.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreTreeSummary {
    pub hashes: Vec<Hash32>,
    pub key_value_hashes: Vec<Hash32>,
    pub values: Vec<ciborium::Value>,
}

impl StoreTreeSummary {
    pub fn from_operations(ops: &[ProofOperation]) -> Result<Self> {
        let mut summary = StoreTreeSummary {
            hashes: Vec::new(),
            key_value_hashes: Vec::new(),
            values: Vec::new(),
        };
        for op in ops {
            match op {
                ProofOperation::Hash(h) => summary.hashes.push(*h),
                ProofOperation::KeyValueHash(h) => summary.key_value_hashes.push(*h),
                ProofOperation::KeyValueEntry { value, .. } => {
                    summary.values.push(decode_value(value)?)
                }
                ProofOperation::Parent | ProofOperation::Child => {}
            }
        }
        Ok(summary)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_operations(&decode_store_tree_proof(bytes)?)
    }
}
