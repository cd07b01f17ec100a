//! Deterministic payload checksums for change detection.
//!
//! The digest is blake3 over a canonical serialization (all object keys
//! sorted, recursively), truncated to a short hex prefix. That is enough to
//! detect content changes cheaply; it is NOT collision-resistant in the
//! security sense and must never be used for auth-grade hashing.

use crate::types::PayloadChecksum;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Length of the truncated hex digest.
pub const CHECKSUM_HEX_LEN: usize = 16;

/// Compute the truncated digest of a lens payload.
///
/// Structurally-equal payloads hash identically regardless of key insertion
/// order upstream.
pub fn checksum(payload: &Map<String, Value>) -> PayloadChecksum {
    let mut hasher = blake3::Hasher::new();
    let canonical = canonicalize(&Value::Object(payload.clone()));
    // canonical values contain only sorted maps, so to_string is stable
    hasher.update(canonical.to_string().as_bytes());
    let hex = hasher.finalize().to_hex().to_string();
    PayloadChecksum::new(&hex[..CHECKSUM_HEX_LEN])
}

/// Rebuild a value with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
