//! Catalog record model, lens tiers, lens generation, and payload checksums
//! for Lenscast.
//!
//! This crate defines the schema layer: the read-only `CatalogRecord` input
//! model, the three nested lens tiers (`CardLens` ⊆ `QuickviewLens` ⊆
//! `PlaybackLens`), the pure `generate` projection, and the deterministic
//! truncated-blake3 `checksum` used for change detection.

pub mod catalog;
pub mod checksum;
pub mod lens;
pub mod types;

pub use catalog::{CatalogRecord, Chapter};
pub use checksum::{checksum, CHECKSUM_HEX_LEN};
pub use lens::{generate, CardLens, Lens, PlaybackLens, QuickviewLens};
pub use types::{AccessHint, ItemId, LensType, PayloadChecksum};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown lens type: '{0}'")]
    UnknownLensType(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
