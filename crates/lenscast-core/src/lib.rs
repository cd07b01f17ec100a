//! Core orchestration engine for Lenscast lens versioning.
//!
//! This crate ties together lens generation, checksumming, and the
//! version/delta stores into the `Engine` — the central API for upserting,
//! reading, batching, refreshing, and pruning lens state. It also provides
//! the pure field-diff algebra, per-key locking discipline, the catalog
//! source seam, and engine configuration.

pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod diff;
pub mod engine;

pub use catalog::{CatalogSource, MemoryCatalog};
pub use concurrency::{KeyLocks, StoreGuard};
pub use config::EngineConfig;
pub use diff::{apply_diff, diff_payloads, merge_diffs, FieldDiff};
pub use engine::{
    BatchItem, BatchResult, DeltaSince, Engine, LensView, RefreshOutcome, RefreshStatus,
    StatsReport, UpsertOutcome,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] lenscast_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] lenscast_store::StoreError),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("concurrent update conflict on ({item_id}, {lens_type}) after {attempts} attempts")]
    Conflict {
        item_id: String,
        lens_type: String,
        attempts: u32,
    },
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
