//! Disclosed values are CBOR documents

use crate::{ProofError, Result};

/// Decode one disclosed value. The payload must hold exactly one CBOR item.
pub fn decode_value(bytes: &[u8]) -> Result<ciborium::Value> {
    let mut reader = bytes;
    let value: ciborium::Value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| ProofError::InvalidValue(e.to_string()))?;
    if !reader.is_empty() {
        return Err(ProofError::InvalidValue(format!(
            "{} trailing bytes after value",
            reader.len()
        )));
    }
    Ok(value)
}
