use crate::catalog::CatalogSource;
use crate::concurrency::{KeyLocks, StoreGuard};
use crate::config::EngineConfig;
use crate::diff::{diff_payloads, merge_diffs};
use crate::CoreError;
use lenscast_schema::types::{ItemId, LensType};
use lenscast_schema::{checksum, generate};
use lenscast_store::versions::validate_item_id;
use lenscast_store::{
    DeltaStore, HistoryEntry, LensDeltaRecord, LensVersionRecord, PruneReport, Pruner, StoreLayout,
    VersionStore,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bounded retry budget for the checksum compare-and-swap on upsert.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

/// Central orchestration engine for lens versioning and delta sync.
///
/// Owns the version and delta stores, the per-key lock discipline, and the
/// catalog read seam. Lens generation, checksumming, and diffing are pure;
/// the stores are the only shared mutable state.
pub struct Engine {
    layout: StoreLayout,
    versions: VersionStore,
    deltas: DeltaStore,
    key_locks: KeyLocks,
    catalog: Arc<dyn CatalogSource>,
    config: EngineConfig,
    _guard: StoreGuard,
}

/// Result of one upsert: the record now current for the key, and whether
/// this call changed it.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: LensVersionRecord,
    pub changed: bool,
}

/// A lens plus its stamped version, as served to callers.
#[derive(Debug, Clone, Serialize)]
pub struct LensView {
    pub item_id: ItemId,
    pub lens_type: LensType,
    pub lens: Map<String, Value>,
    pub version: u64,
}

impl From<LensVersionRecord> for LensView {
    fn from(record: LensVersionRecord) -> Self {
        Self {
            item_id: record.item_id,
            lens_type: record.lens_type,
            lens: record.payload,
            version: record.version,
        }
    }
}

/// Answer to "what changed since version N?".
#[derive(Debug, Clone, Serialize)]
pub struct DeltaSince {
    pub has_changes: bool,
    pub current_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Map<String, Value>>,
}

impl DeltaSince {
    fn unchanged(current_version: u64) -> Self {
        Self {
            has_changes: false,
            current_version,
            changed_fields: None,
            delta: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Created,
    Updated,
    Unchanged,
}

/// Per-lens-type result of a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub lens_type: LensType,
    pub status: RefreshStatus,
    pub version: u64,
}

/// One entry of a viewport batch response. `delta` is attached only when
/// the caller reported an older version for the item; otherwise the field
/// is absent, not null.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub item_id: ItemId,
    pub lens: Map<String, Value>,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaSince>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
    pub count: usize,
}

/// Aggregate version/delta counts for observability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsReport {
    pub card: usize,
    pub quickview: usize,
    pub playback: usize,
    pub total_versions: usize,
    pub total_deltas: usize,
}

impl Engine {
    /// Create an engine rooted at the given data directory.
    ///
    /// Initializes the store layout and takes the process-exclusive store
    /// guard; a second engine on the same directory fails here.
    pub fn new(
        store_root: impl Into<PathBuf>,
        catalog: Arc<dyn CatalogSource>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(store_root);
        layout.initialize()?;
        let guard = StoreGuard::acquire(&layout.lock_file())?;

        Ok(Self {
            versions: VersionStore::new(layout.clone()),
            deltas: DeltaStore::new(layout.clone()),
            key_locks: KeyLocks::new(),
            catalog,
            config,
            layout,
            _guard: guard,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Upsert a lens payload for one key.
    ///
    /// Holds the key's mutex across the whole read-diff-write window. A
    /// checksum compare-and-swap re-checks the stored state before writing;
    /// after `MAX_UPSERT_ATTEMPTS` mismatches the conflict is surfaced
    /// rather than a version increment being silently skipped.
    pub fn upsert(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
        payload: Map<String, Value>,
    ) -> Result<UpsertOutcome, CoreError> {
        validate_item_id(item_id)?;
        let lock = self.key_locks.key(item_id, lens_type);
        let _held = lock.lock().expect("key lock poisoned");

        let new_checksum = checksum(&payload);
        let now = chrono::Utc::now().to_rfc3339();

        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            let current = self.versions.get(item_id, lens_type)?;

            let Some(current) = current else {
                let record = LensVersionRecord {
                    item_id: item_id.clone(),
                    lens_type,
                    version: 1,
                    payload: payload.clone(),
                    checksum: new_checksum.clone(),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                self.versions.put(&record)?;
                debug!("created ({item_id}, {lens_type}) at v1");
                return Ok(UpsertOutcome {
                    record,
                    changed: true,
                });
            };

            // Strict no-op: checksum-equal content never advances the version,
            // whatever unrelated upstream write triggered the regeneration.
            if current.checksum == new_checksum {
                return Ok(UpsertOutcome {
                    record: current,
                    changed: false,
                });
            }

            let record = LensVersionRecord {
                item_id: item_id.clone(),
                lens_type,
                version: current.version + 1,
                payload: payload.clone(),
                checksum: new_checksum.clone(),
                created_at: current.created_at.clone(),
                updated_at: now.clone(),
            };

            // CAS guard: the stored checksum must still be the one we diffed
            // against. Under the key lock this only trips on out-of-band
            // modification of the backing file.
            let stored = self.versions.get(item_id, lens_type)?;
            if stored.as_ref().map(|r| &r.checksum) != Some(&current.checksum) {
                warn!("upsert CAS mismatch on ({item_id}, {lens_type}), attempt {attempt}");
                continue;
            }

            self.versions.put(&record)?;

            if let Some(diff) = diff_payloads(&current.payload, &payload) {
                let delta_checksum = checksum(&diff.values);
                let delta = LensDeltaRecord {
                    item_id: item_id.clone(),
                    lens_type,
                    from_version: current.version,
                    to_version: record.version,
                    changed_fields: diff.changed_fields_vec(),
                    delta_payload: diff.values,
                    checksum: delta_checksum,
                    created_at: now.clone(),
                };
                self.deltas.insert(&delta, self.config.delta_retention)?;
            }

            debug!(
                "updated ({item_id}, {lens_type}) v{} -> v{}",
                current.version, record.version
            );
            return Ok(UpsertOutcome {
                record,
                changed: true,
            });
        }

        Err(CoreError::Conflict {
            item_id: item_id.to_string(),
            lens_type: lens_type.to_string(),
            attempts: MAX_UPSERT_ATTEMPTS,
        })
    }

    /// Generate the lens from the catalog record and upsert it.
    pub fn generate_and_upsert(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
    ) -> Result<UpsertOutcome, CoreError> {
        let Some(record) = self.catalog.get_record(item_id)? else {
            return Err(CoreError::ItemNotFound(item_id.to_string()));
        };
        let lens = generate(&record, lens_type, record.owned_flag());
        let payload = lens.payload()?;
        self.upsert(item_id, lens_type, payload)
    }

    /// Current lens for a key, generating and caching it on miss
    /// (read-through cache-fill-on-miss).
    pub fn lens(&self, item_id: &ItemId, lens_type: LensType) -> Result<LensView, CoreError> {
        if let Some(record) = self.versions.get(item_id, lens_type)? {
            return Ok(record.into());
        }
        Ok(self.generate_and_upsert(item_id, lens_type)?.record.into())
    }

    /// Regenerate all three lens tiers for one item.
    pub fn refresh(&self, item_id: &ItemId) -> Result<Vec<RefreshOutcome>, CoreError> {
        let mut outcomes = Vec::with_capacity(LensType::ALL.len());
        for lens_type in LensType::ALL {
            let before = self.versions.version(item_id, lens_type)?;
            let outcome = self.generate_and_upsert(item_id, lens_type)?;
            let status = if !outcome.changed {
                RefreshStatus::Unchanged
            } else if before == 0 {
                RefreshStatus::Created
            } else {
                RefreshStatus::Updated
            };
            outcomes.push(RefreshOutcome {
                lens_type,
                status,
                version: outcome.record.version,
            });
        }
        info!("refreshed {item_id}: {outcomes:?}");
        Ok(outcomes)
    }

    /// Drop the current record and delta history for a key. Subsequent
    /// delta queries observe "no current version" rather than an error.
    pub fn invalidate(&self, item_id: &ItemId, lens_type: LensType) -> Result<(), CoreError> {
        let lock = self.key_locks.key(item_id, lens_type);
        let _held = lock.lock().expect("key lock poisoned");
        self.versions.remove(item_id, lens_type)?;
        self.deltas.remove_key(item_id, lens_type)?;
        Ok(())
    }

    /// What changed for a key since the caller's version.
    ///
    /// Merges retained deltas when they contiguously cover
    /// `since → current`; any gap (pruned history, or `since` predating the
    /// oldest retained delta) falls back to the full current payload with
    /// every top-level key marked changed — conservative but always correct.
    pub fn delta_since(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
        since: u64,
    ) -> Result<DeltaSince, CoreError> {
        let Some(current) = self.versions.get(item_id, lens_type)? else {
            return Ok(DeltaSince::unchanged(0));
        };
        if current.version <= since {
            return Ok(DeltaSince::unchanged(current.version));
        }

        let span: Vec<LensDeltaRecord> = self
            .deltas
            .list_for_key(item_id, lens_type)?
            .into_iter()
            .filter(|d| d.from_version >= since && d.to_version <= current.version)
            .collect();

        if !covers_span(&span, since, current.version) {
            debug!(
                "history gap on ({item_id}, {lens_type}): since {since}, current {}",
                current.version
            );
            let changed_fields: Vec<String> = current.payload.keys().cloned().collect();
            return Ok(DeltaSince {
                has_changes: true,
                current_version: current.version,
                changed_fields: Some(changed_fields),
                delta: Some(current.payload),
            });
        }

        let merged = merge_diffs(
            span.iter()
                .map(|d| (d.changed_fields.as_slice(), &d.delta_payload)),
        );
        Ok(DeltaSince {
            has_changes: true,
            current_version: current.version,
            changed_fields: Some(merged.changed_fields_vec()),
            delta: Some(merged.values),
        })
    }

    /// Most-recent-first delta history for a key.
    pub fn history(
        &self,
        item_id: &ItemId,
        lens_type: LensType,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        Ok(self.deltas.history(item_id, lens_type, limit)?)
    }

    /// Batched lens retrieval for a viewport of items.
    ///
    /// Bounds are validated before any storage access. Per item: absent
    /// catalog entries are silently omitted; storage failures are logged
    /// with the key and skip only that item; input order is preserved.
    pub fn batch(
        &self,
        item_ids: &[ItemId],
        lens_type: LensType,
        client_versions: &HashMap<ItemId, u64>,
    ) -> Result<BatchResult, CoreError> {
        if item_ids.is_empty() {
            return Err(CoreError::Validation("itemIds must not be empty".to_owned()));
        }
        if item_ids.len() > self.config.max_batch {
            return Err(CoreError::Validation(format!(
                "itemIds exceeds the {}-item batch cap",
                self.config.max_batch
            )));
        }

        let mut items = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let view = match self.lens(item_id, lens_type) {
                Ok(view) => view,
                Err(CoreError::ItemNotFound(_)) => continue,
                Err(e) => {
                    warn!("batch: skipping ({item_id}, {lens_type}): {e}");
                    continue;
                }
            };

            let delta = match client_versions.get(item_id) {
                Some(&known) if known < view.version => {
                    match self.delta_since(item_id, lens_type, known) {
                        Ok(ds) if ds.has_changes => Some(ds),
                        Ok(_) => None,
                        Err(e) => {
                            warn!("batch: delta for ({item_id}, {lens_type}) failed: {e}");
                            None
                        }
                    }
                }
                _ => None,
            };

            items.push(BatchItem {
                item_id: item_id.clone(),
                lens: view.lens,
                version: view.version,
                delta,
            });
        }

        let count = items.len();
        Ok(BatchResult { items, count })
    }

    pub fn stats(&self) -> Result<StatsReport, CoreError> {
        let counts = self.versions.count_by_type()?;
        let total_versions = counts.iter().map(|(_, n)| n).sum();
        Ok(StatsReport {
            card: counts[0].1,
            quickview: counts[1].1,
            playback: counts[2].1,
            total_versions,
            total_deltas: self.deltas.total_count()?,
        })
    }

    /// Age-based delta pruning; see [`Pruner`].
    pub fn prune_older_than(&self, days: i64) -> Result<PruneReport, CoreError> {
        Ok(Pruner::new(self.layout.clone()).prune_older_than(days)?)
    }
}

/// True when `span` (ascending) contiguously covers `since → current`.
fn covers_span(span: &[LensDeltaRecord], since: u64, current: u64) -> bool {
    let Some(first) = span.first() else {
        return false;
    };
    if first.from_version != since {
        return false;
    }
    let mut expected = since;
    for delta in span {
        if delta.from_version != expected {
            return false;
        }
        expected = delta.to_version;
    }
    expected == current
}
