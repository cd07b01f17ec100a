use crate::deltas::LensDeltaRecord;
use crate::layout::StoreLayout;
use crate::StoreError;
use chrono::{DateTime, Duration, Utc};
use std::fs;

/// Outcome of one age-based pruning pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneReport {
    pub examined: usize,
    pub deleted: usize,
}

/// Age-based delta pruning.
///
/// Only delta history is ever removed; current version records are never
/// touched, so pruning can at worst push an old client into the history-gap
/// fallback, never lose current state. Safe to run under concurrent
/// traffic and idempotent.
pub struct Pruner {
    layout: StoreLayout,
}

impl Pruner {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Delete delta records older than `days`. Records with unparsable
    /// timestamps are left in place and logged.
    pub fn prune_older_than(&self, days: i64) -> Result<PruneReport, StoreError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut report = PruneReport::default();

        let dir = self.layout.deltas_dir();
        if !dir.exists() {
            return Ok(report);
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            report.examined += 1;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            let created_at = match fs::read_to_string(&path) {
                Ok(content) => serde_json::from_str::<LensDeltaRecord>(&content)
                    .ok()
                    .map(|r| r.created_at),
                // Vanished under concurrent traffic: nothing to do
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };

            let Some(created_at) = created_at else {
                tracing::warn!("prune: skipping unreadable delta record '{name}'");
                continue;
            };
            let Ok(timestamp) = created_at.parse::<DateTime<Utc>>() else {
                tracing::warn!("prune: skipping delta '{name}' with bad timestamp '{created_at}'");
                continue;
            };

            if timestamp < cutoff {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::debug!("pruned aged delta {name}");
                        report.deleted += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::Io(e)),
                }
            }
        }

        tracing::info!(
            "prune pass: examined {}, deleted {}",
            report.examined,
            report.deleted
        );
        Ok(report)
    }
}
