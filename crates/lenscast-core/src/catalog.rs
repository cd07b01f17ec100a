//! The catalog lookup seam.
//!
//! Lenscast only consumes a read interface to catalog records; ingestion and
//! the authoritative write path live in the external catalog subsystem,
//! which drives regeneration via the refresh endpoint when content changes.

use crate::CoreError;
use lenscast_schema::{CatalogRecord, ItemId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Read interface to catalog records, owned externally.
pub trait CatalogSource: Send + Sync {
    /// Look up one record. `Ok(None)` means the item does not exist.
    fn get_record(&self, item_id: &ItemId) -> Result<Option<CatalogRecord>, CoreError>;
}

/// In-memory catalog backing the server binary (seeded from a JSON file)
/// and the test suites. Mutations stand in for the external catalog
/// writer's "content changed" signal.
#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<HashMap<ItemId, CatalogRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of records.
    pub fn from_records(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.item_id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    pub fn put(&self, record: CatalogRecord) {
        let mut records = self.records.write().expect("catalog lock poisoned");
        records.insert(record.item_id.clone(), record);
    }

    pub fn remove(&self, item_id: &ItemId) {
        let mut records = self.records.write().expect("catalog lock poisoned");
        records.remove(item_id);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("catalog lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogSource for MemoryCatalog {
    fn get_record(&self, item_id: &ItemId) -> Result<Option<CatalogRecord>, CoreError> {
        let records = self.records.read().expect("catalog lock poisoned");
        Ok(records.get(item_id).cloned())
    }
}
