//! Pure field-level diff algebra over lens payloads.
//!
//! Diffs compare top-level keys with deep value equality. A removed key is
//! represented by the JSON `null` sentinel, which lens payloads themselves
//! never contain (absent inputs map to absent fields, never `null`), so the
//! sentinel is unambiguous. All three functions are pure and independently
//! testable.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// The changed-field set and new values between two payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    /// Sorted set of changed top-level keys.
    pub changed_fields: BTreeSet<String>,
    /// Changed key → new value; removed key → `Value::Null`.
    pub values: Map<String, Value>,
}

impl FieldDiff {
    pub fn changed_fields_vec(&self) -> Vec<String> {
        self.changed_fields.iter().cloned().collect()
    }
}

/// Diff `previous` against `current` over top-level keys.
///
/// Returns `None` when nothing changed, so callers never persist an empty
/// delta record.
pub fn diff_payloads(
    previous: &Map<String, Value>,
    current: &Map<String, Value>,
) -> Option<FieldDiff> {
    let mut changed_fields = BTreeSet::new();
    let mut values = Map::new();

    for (key, value) in current {
        if previous.get(key) != Some(value) {
            changed_fields.insert(key.clone());
            values.insert(key.clone(), value.clone());
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            changed_fields.insert(key.clone());
            values.insert(key.clone(), Value::Null);
        }
    }

    if changed_fields.is_empty() {
        None
    } else {
        Some(FieldDiff {
            changed_fields,
            values,
        })
    }
}

/// Apply a diff to a base payload, honoring the `null` removal sentinel.
pub fn apply_diff(base: &Map<String, Value>, diff: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, value) in diff {
        match value {
            Value::Null => {
                result.remove(key);
            }
            other => {
                result.insert(key.clone(), other.clone());
            }
        }
    }
    result
}

/// Merge diffs in chronological order: union of changed fields,
/// last-write-wins values.
///
/// For deltas spanning v→v+k within retained history, this equals a direct
/// diff from v to v+k.
pub fn merge_diffs<'a>(
    chronological: impl IntoIterator<Item = (&'a [String], &'a Map<String, Value>)>,
) -> FieldDiff {
    let mut changed_fields = BTreeSet::new();
    let mut values = Map::new();
    for (fields, payload) in chronological {
        changed_fields.extend(fields.iter().cloned());
        for (key, value) in payload {
            values.insert(key.clone(), value.clone());
        }
    }
    FieldDiff {
        changed_fields,
        values,
    }
}
