use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use lenscast_schema::checksum;
use lenscast_schema::types::{ItemId, LensType, PayloadChecksum};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Current lens state for one (item, lens type) key.
///
/// Invariants: `version >= 1`, `checksum` always matches `payload`, and the
/// version advances by exactly 1 per accepted content change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LensVersionRecord {
    pub item_id: ItemId,
    pub lens_type: LensType,
    pub version: u64,
    pub payload: Map<String, Value>,
    pub checksum: PayloadChecksum,
    pub created_at: String,
    pub updated_at: String,
}

/// File key for one (item, lens type) pair: `{item_id}.{lens_type}`.
pub(crate) fn record_key(item_id: &ItemId, lens_type: LensType) -> String {
    format!("{item_id}.{}", lens_type.as_str())
}

/// Reject item ids that cannot serve as safe file names.
pub fn validate_item_id(item_id: &str) -> Result<(), StoreError> {
    let valid = !item_id.is_empty()
        && item_id.len() <= 128
        && !item_id.starts_with('.')
        && item_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid item id '{item_id}'"),
        )))
    }
}

pub struct VersionStore {
    layout: StoreLayout,
}

impl VersionStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Persist a version record atomically.
    ///
    /// The payload checksum is recomputed and compared against the record's
    /// before anything touches disk, so a record with checksum/payload
    /// disagreement can never be written.
    pub fn put(&self, record: &LensVersionRecord) -> Result<(), StoreError> {
        let computed = checksum(&record.payload);
        if computed != record.checksum {
            return Err(StoreError::ChecksumMismatch {
                key: record_key(&record.item_id, record.lens_type),
                stored: record.checksum.to_string(),
                computed: computed.into_inner(),
            });
        }

        let dir = self.layout.versions_dir();
        let dest = dir.join(record_key(&record.item_id, record.lens_type));
        let content = serde_json::to_string_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(())
    }

    /// Read the current record, or `None` if the key is absent.
    ///
    /// The stored checksum is re-verified against the stored payload;
    /// corruption is surfaced as an error, never served.
    pub fn get(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
    ) -> Result<Option<LensVersionRecord>, StoreError> {
        let key = record_key(item_id, lens_type);
        let path = self.layout.versions_dir().join(&key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let record: LensVersionRecord = serde_json::from_str(&content)?;

        let computed = checksum(&record.payload);
        if computed != record.checksum {
            return Err(StoreError::ChecksumMismatch {
                key,
                stored: record.checksum.to_string(),
                computed: computed.into_inner(),
            });
        }

        Ok(Some(record))
    }

    /// Current version for a key, 0 if absent.
    pub fn version(&self, item_id: &ItemId, lens_type: LensType) -> Result<u64, StoreError> {
        Ok(self.get(item_id, lens_type)?.map_or(0, |r| r.version))
    }

    pub fn exists(&self, item_id: &ItemId, lens_type: LensType) -> bool {
        self.layout
            .versions_dir()
            .join(record_key(item_id, lens_type))
            .exists()
    }

    /// Remove the record for a key (explicit invalidation). Absent keys are
    /// a no-op.
    pub fn remove(&self, item_id: &ItemId, lens_type: LensType) -> Result<(), StoreError> {
        let path = self
            .layout
            .versions_dir()
            .join(record_key(item_id, lens_type));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// All stored records, sorted by key. Corrupt entries are skipped with a
    /// warning so one bad file cannot take down stats or listings.
    pub fn list(&self) -> Result<Vec<LensVersionRecord>, StoreError> {
        let dir = self.layout.versions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            if name_str.starts_with('.') {
                continue;
            }
            match fs::read_to_string(entry.path())
                .map_err(StoreError::Io)
                .and_then(|c| serde_json::from_str(&c).map_err(StoreError::Serialization))
            {
                Ok(record) => results.push(record),
                Err(e) => {
                    tracing::warn!("skipping corrupted version record '{name_str}': {e}");
                }
            }
        }
        results.sort_by(|a: &LensVersionRecord, b: &LensVersionRecord| {
            (a.item_id.as_str(), a.lens_type).cmp(&(b.item_id.as_str(), b.lens_type))
        });
        Ok(results)
    }

    /// Record counts per lens type, for the stats endpoint.
    pub fn count_by_type(&self) -> Result<[(LensType, usize); 3], StoreError> {
        let mut counts = [
            (LensType::Card, 0),
            (LensType::Quickview, 0),
            (LensType::Playback, 0),
        ];
        for record in self.list()? {
            for slot in &mut counts {
                if slot.0 == record.lens_type {
                    slot.1 += 1;
                }
            }
        }
        Ok(counts)
    }
}
