//! File-backed persistence for lens version records and delta history.
//!
//! This crate provides the storage layer: `VersionStore` for the current
//! payload/version/checksum per (item, lens type), `DeltaStore` for bounded
//! field-level delta history, `StoreLayout` for directory structure, and
//! `Pruner` for age-based delta cleanup. All writes are atomic
//! (tempfile + rename + parent-dir fsync), so no failure path can leave a
//! version record with checksum/payload disagreement.

pub mod deltas;
pub mod layout;
pub mod prune;
pub mod versions;

pub use deltas::{DeltaStore, HistoryEntry, LensDeltaRecord};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use prune::{PruneReport, Pruner};
pub use versions::{LensVersionRecord, VersionStore};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum/payload disagreement for '{key}': stored {stored}, computed {computed}")]
    ChecksumMismatch {
        key: String,
        stored: String,
        computed: String,
    },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
