//! Read-only catalog record model.
//!
//! `CatalogRecord` is owned by the external catalog subsystem; this crate
//! only consumes it as input to lens generation. Every field beyond the id
//! and title is optional so that partially-populated records from upstream
//! providers still project cleanly.

use crate::types::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chapter or section marker inside an item, surfaced on playback lenses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<u64>,
}

/// A single catalog item as delivered by the catalog lookup interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub item_id: ItemId,
    pub title: String,
    /// Item kind as reported upstream ("video", "book", "app", ...).
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Upstream access descriptor ("purchase", "rental", "subscription").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Arbitrary provider metadata, passed through to playback lenses.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CatalogRecord {
    /// Minimal record with only the required fields set.
    pub fn new(item_id: impl Into<ItemId>, title: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            item_type: item_type.into(),
            thumbnail: None,
            price: None,
            currency: None,
            access_mode: None,
            description: None,
            provider: None,
            rating: None,
            duration_minutes: None,
            page_count: None,
            category: None,
            tags: Vec::new(),
            chapters: Vec::new(),
            capabilities: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Whether the record's metadata marks the item as owned by the caller.
    pub fn owned_flag(&self) -> bool {
        matches!(self.metadata.get("owned"), Some(Value::Bool(true)))
    }
}
