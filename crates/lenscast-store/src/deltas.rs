use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use lenscast_schema::types::{ItemId, LensType, PayloadChecksum};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Field-level diff between two successive versions of one lens.
///
/// `delta_payload` maps changed top-level keys to their new values; removed
/// keys map to JSON `null` as the removal sentinel. `to_version` is always
/// `from_version + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LensDeltaRecord {
    pub item_id: ItemId,
    pub lens_type: LensType,
    pub from_version: u64,
    pub to_version: u64,
    pub changed_fields: Vec<String>,
    pub delta_payload: Map<String, Value>,
    pub checksum: PayloadChecksum,
    pub created_at: String,
}

/// One line of delta history, as returned by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub from_version: u64,
    pub to_version: u64,
    pub changed_fields: Vec<String>,
    pub created_at: String,
}

/// Zero-padded to_version keeps directory listings in version order.
fn delta_file_name(item_id: &ItemId, lens_type: LensType, to_version: u64) -> String {
    format!("{item_id}.{}.{to_version:020}", lens_type.as_str())
}

fn key_prefix(item_id: &ItemId, lens_type: LensType) -> String {
    format!("{item_id}.{}.", lens_type.as_str())
}

/// True when `name` belongs to exactly this key. Prefix matching alone is
/// not enough: item ids may themselves end in a lens-type name (`a.card`),
/// so the remainder after the prefix must be exactly the 20-digit version
/// field and nothing else.
fn is_key_file(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.len() == 20 && rest.bytes().all(|b| b.is_ascii_digit()))
}

pub struct DeltaStore {
    layout: StoreLayout,
}

impl DeltaStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Persist a delta record, then prune the key down to the `retention`
    /// most-recent records by `to_version`.
    pub fn insert(&self, record: &LensDeltaRecord, retention: usize) -> Result<(), StoreError> {
        let dir = self.layout.deltas_dir();
        let dest = dir.join(delta_file_name(
            &record.item_id,
            record.lens_type,
            record.to_version,
        ));
        let content = serde_json::to_string_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        self.enforce_retention(&record.item_id, record.lens_type, retention)
    }

    fn enforce_retention(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
        retention: usize,
    ) -> Result<(), StoreError> {
        let mut names = self.key_file_names(item_id, lens_type)?;
        if names.len() <= retention {
            return Ok(());
        }
        // names sort ascending by to_version thanks to zero-padding
        names.sort();
        let excess = names.len() - retention;
        for name in names.into_iter().take(excess) {
            let path = self.layout.deltas_dir().join(&name);
            tracing::debug!("retention cap: dropping delta {name}");
            if let Err(e) = fs::remove_file(&path) {
                // Already gone is fine (concurrent prune)
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(StoreError::Io(e));
                }
            }
        }
        Ok(())
    }

    fn key_file_names(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
    ) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.deltas_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = key_prefix(item_id, lens_type);
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if is_key_file(name, &prefix) {
                    names.push(name.to_owned());
                }
            }
        }
        Ok(names)
    }

    /// Retained deltas for a key, ascending by `to_version`. Corrupt entries
    /// are skipped with a warning.
    pub fn list_for_key(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
    ) -> Result<Vec<LensDeltaRecord>, StoreError> {
        let mut names = self.key_file_names(item_id, lens_type)?;
        names.sort();
        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let path = self.layout.deltas_dir().join(&name);
            match fs::read_to_string(&path)
                .map_err(StoreError::Io)
                .and_then(|c| serde_json::from_str(&c).map_err(StoreError::Serialization))
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("skipping corrupted delta record '{name}': {e}");
                }
            }
        }
        Ok(records)
    }

    /// `from_version` of the oldest retained delta, or `None` when the key
    /// has no delta history.
    pub fn oldest_from_version(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self
            .list_for_key(item_id, lens_type)?
            .first()
            .map(|r| r.from_version))
    }

    /// Most-recent-first history summaries, capped at `limit`.
    pub fn history(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let records = self.list_for_key(item_id, lens_type)?;
        Ok(records
            .into_iter()
            .rev()
            .take(limit)
            .map(|r| HistoryEntry {
                from_version: r.from_version,
                to_version: r.to_version,
                changed_fields: r.changed_fields,
                created_at: r.created_at,
            })
            .collect())
    }

    /// Drop all delta history for a key (explicit invalidation).
    pub fn remove_key(&self, item_id: &ItemId, lens_type: LensType) -> Result<(), StoreError> {
        for name in self.key_file_names(item_id, lens_type)? {
            let path = self.layout.deltas_dir().join(&name);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(StoreError::Io(e));
                }
            }
        }
        Ok(())
    }

    /// Total retained delta records across all keys, for stats.
    pub fn total_count(&self) -> Result<usize, StoreError> {
        let dir = self.layout.deltas_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenscast_schema::checksum;
    use serde_json::json;

    fn test_store() -> (tempfile::TempDir, DeltaStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, DeltaStore::new(layout))
    }

    fn sample_delta(item: &str, from: u64) -> LensDeltaRecord {
        let mut payload = Map::new();
        payload.insert("title".to_owned(), json!(format!("title-v{}", from + 1)));
        let cs = checksum(&payload);
        LensDeltaRecord {
            item_id: item.into(),
            lens_type: LensType::Card,
            from_version: from,
            to_version: from + 1,
            changed_fields: vec!["title".to_owned()],
            delta_payload: payload,
            checksum: cs,
            created_at: "2026-01-01T00:00:00Z".to_owned(),
        }
    }

    #[test]
    fn insert_and_list_in_version_order() {
        let (_dir, store) = test_store();
        store.insert(&sample_delta("item-1", 2), 10).unwrap();
        store.insert(&sample_delta("item-1", 1), 10).unwrap();
        store.insert(&sample_delta("item-1", 3), 10).unwrap();

        let list = store.list_for_key(&"item-1".into(), LensType::Card).unwrap();
        let versions: Vec<u64> = list.iter().map(|r| r.to_version).collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[test]
    fn retention_cap_keeps_most_recent() {
        let (_dir, store) = test_store();
        for from in 1..=6 {
            store.insert(&sample_delta("item-1", from), 3).unwrap();
        }
        let list = store.list_for_key(&"item-1".into(), LensType::Card).unwrap();
        let versions: Vec<u64> = list.iter().map(|r| r.to_version).collect();
        assert_eq!(versions, vec![5, 6, 7]);
    }

    #[test]
    fn retention_is_per_key() {
        let (_dir, store) = test_store();
        for from in 1..=4 {
            store.insert(&sample_delta("item-a", from), 2).unwrap();
            store.insert(&sample_delta("item-b", from), 2).unwrap();
        }
        assert_eq!(
            store.list_for_key(&"item-a".into(), LensType::Card).unwrap().len(),
            2
        );
        assert_eq!(
            store.list_for_key(&"item-b".into(), LensType::Card).unwrap().len(),
            2
        );
    }

    #[test]
    fn oldest_from_version_reflects_retention() {
        let (_dir, store) = test_store();
        assert_eq!(
            store.oldest_from_version(&"item-1".into(), LensType::Card).unwrap(),
            None
        );
        for from in 1..=5 {
            store.insert(&sample_delta("item-1", from), 3).unwrap();
        }
        assert_eq!(
            store.oldest_from_version(&"item-1".into(), LensType::Card).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn history_is_most_recent_first_and_limited() {
        let (_dir, store) = test_store();
        for from in 1..=5 {
            store.insert(&sample_delta("item-1", from), 10).unwrap();
        }
        let history = store.history(&"item-1".into(), LensType::Card, 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].to_version, 6);
        assert_eq!(history[1].to_version, 5);
        assert_eq!(history[2].to_version, 4);
        assert_eq!(history[0].changed_fields, vec!["title".to_owned()]);
    }

    #[test]
    fn remove_key_clears_only_that_key() {
        let (_dir, store) = test_store();
        store.insert(&sample_delta("item-a", 1), 10).unwrap();
        store.insert(&sample_delta("item-b", 1), 10).unwrap();
        store.remove_key(&"item-a".into(), LensType::Card).unwrap();
        assert!(store.list_for_key(&"item-a".into(), LensType::Card).unwrap().is_empty());
        assert_eq!(
            store.list_for_key(&"item-b".into(), LensType::Card).unwrap().len(),
            1
        );
    }

    #[test]
    fn total_count_spans_keys() {
        let (_dir, store) = test_store();
        store.insert(&sample_delta("item-a", 1), 10).unwrap();
        store.insert(&sample_delta("item-a", 2), 10).unwrap();
        store.insert(&sample_delta("item-b", 1), 10).unwrap();
        assert_eq!(store.total_count().unwrap(), 3);
    }

    #[test]
    fn item_ids_with_dots_do_not_collide() {
        let (_dir, store) = test_store();
        store.insert(&sample_delta("a.b", 1), 10).unwrap();
        store.insert(&sample_delta("a", 1), 10).unwrap();
        assert_eq!(
            store.list_for_key(&"a".into(), LensType::Card).unwrap().len(),
            1
        );
        assert_eq!(
            store.list_for_key(&"a.b".into(), LensType::Card).unwrap().len(),
            1
        );
    }

    #[test]
    fn item_ids_ending_in_lens_type_names_do_not_collide() {
        let (_dir, store) = test_store();
        // "a.card"'s files start with "a.card.card.", which begins with
        // item "a"'s key prefix "a.card."
        for item in ["a", "a.card", "a.quickview", "a.playback"] {
            store.insert(&sample_delta(item, 1), 10).unwrap();
        }

        let ids: Vec<String> = store
            .list_for_key(&"a".into(), LensType::Card)
            .unwrap()
            .iter()
            .map(|r| r.item_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a".to_owned()]);

        let list = store.list_for_key(&"a.card".into(), LensType::Card).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].item_id.as_str(), "a.card");

        store.remove_key(&"a".into(), LensType::Card).unwrap();
        assert!(store.list_for_key(&"a".into(), LensType::Card).unwrap().is_empty());
        assert_eq!(
            store.list_for_key(&"a.card".into(), LensType::Card).unwrap().len(),
            1
        );
    }

    #[test]
    fn retention_never_evicts_a_colliding_keys_deltas() {
        let (_dir, store) = test_store();
        store.insert(&sample_delta("a.card", 1), 2).unwrap();
        // Filling item "a" past its cap must not count or evict
        // "a.card"'s records
        for from in 1..=5 {
            store.insert(&sample_delta("a", from), 2).unwrap();
        }

        let a: Vec<u64> = store
            .list_for_key(&"a".into(), LensType::Card)
            .unwrap()
            .iter()
            .map(|r| r.to_version)
            .collect();
        assert_eq!(a, vec![5, 6]);
        assert_eq!(
            store.list_for_key(&"a.card".into(), LensType::Card).unwrap().len(),
            1
        );
    }
}
