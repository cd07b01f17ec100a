//! Lens tiers and the pure generation function.
//!
//! The three tiers form a strict field superset chain enforced by embedding:
//! `QuickviewLens` flattens a `CardLens`, `PlaybackLens` flattens a
//! `QuickviewLens`. A playback payload therefore satisfies the quickview and
//! card contracts field-for-field by construction.
//!
//! Versions are stamped by the version store, not here: generated payloads
//! carry no version field, so regenerating unchanged content produces a
//! checksum-identical payload.

use crate::catalog::{CatalogRecord, Chapter};
use crate::types::{AccessHint, ItemId, LensType};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Smallest tier: what a grid cell needs. Heavy fields (description,
/// metadata) are excluded by contract — a size budget, not an omission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardLens {
    pub item_id: ItemId,
    pub title: String,
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art: Option<String>,
    pub access_hint: AccessHint,
}

/// Mid tier: card plus the fields a hover/preview panel renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickviewLens {
    #[serde(flatten)]
    pub card: CardLens,
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
}

/// Full tier: everything a consumption surface needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackLens {
    #[serde(flatten)]
    pub quickview: QuickviewLens,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A generated lens of any tier. Serialize-only: stored and transmitted
/// lenses travel as flat JSON objects, not as this enum.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Lens {
    Playback(PlaybackLens),
    Quickview(QuickviewLens),
    Card(CardLens),
}

impl Lens {
    pub fn lens_type(&self) -> LensType {
        match self {
            Lens::Card(_) => LensType::Card,
            Lens::Quickview(_) => LensType::Quickview,
            Lens::Playback(_) => LensType::Playback,
        }
    }

    /// The lens as a flat JSON object, suitable for checksumming, storage,
    /// and field-level diffing.
    pub fn payload(&self) -> Result<Map<String, Value>, SchemaError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // Flattened struct serialization always yields an object.
            other => Err(SchemaError::Serialization(serde::ser::Error::custom(
                format!("lens serialized to non-object: {other}"),
            ))),
        }
    }
}

fn access_hint(record: &CatalogRecord, owned: bool) -> AccessHint {
    if owned {
        return AccessHint::Owned;
    }
    if record.price == Some(0.0) {
        return AccessHint::Free;
    }
    match record.access_mode.as_deref() {
        Some("rental") => AccessHint::Rental,
        Some("subscription") => AccessHint::Subscription,
        _ => AccessHint::Purchase,
    }
}

fn card(record: &CatalogRecord, owned: bool) -> CardLens {
    CardLens {
        item_id: record.item_id.clone(),
        title: record.title.clone(),
        item_type: record.item_type.clone(),
        art: record.thumbnail.clone(),
        access_hint: access_hint(record, owned),
    }
}

fn quickview(record: &CatalogRecord, owned: bool) -> QuickviewLens {
    QuickviewLens {
        card: card(record, owned),
        description: record.description.clone(),
        provider: record.provider.clone(),
        rating: record.rating,
        duration_minutes: record.duration_minutes,
        page_count: record.page_count,
        category: record.category.clone(),
        tags: record.tags.clone(),
    }
}

fn playback(record: &CatalogRecord, owned: bool) -> PlaybackLens {
    PlaybackLens {
        quickview: quickview(record, owned),
        access_mode: record.access_mode.clone(),
        price: record.price,
        currency: record.currency.clone(),
        chapters: record.chapters.clone(),
        capabilities: record.capabilities.clone(),
        metadata: record.metadata.clone(),
    }
}

/// Project a catalog record into one lens tier. Deterministic and pure;
/// missing optional inputs map to absent output fields, never `null`, so
/// checksums are stable regardless of upstream construction order.
pub fn generate(record: &CatalogRecord, lens_type: LensType, owned: bool) -> Lens {
    match lens_type {
        LensType::Card => Lens::Card(card(record, owned)),
        LensType::Quickview => Lens::Quickview(quickview(record, owned)),
        LensType::Playback => Lens::Playback(playback(record, owned)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CatalogRecord {
        let mut rec = CatalogRecord::new("item-1", "The Title", "video");
        rec.thumbnail = Some("https://cdn/art.png".to_owned());
        rec.price = Some(4.99);
        rec.currency = Some("EUR".to_owned());
        rec.description = Some("A description".to_owned());
        rec.provider = Some("acme".to_owned());
        rec.rating = Some(4.2);
        rec.duration_minutes = Some(95);
        rec.category = Some("drama".to_owned());
        rec.tags = vec!["indie".to_owned(), "festival".to_owned()];
        rec.chapters = vec![Chapter {
            title: "Opening".to_owned(),
            start_seconds: Some(0),
        }];
        rec.capabilities = vec!["hdr".to_owned()];
        rec.metadata
            .insert("studio".to_owned(), Value::String("acme-films".to_owned()));
        rec
    }

    #[test]
    fn card_excludes_heavy_fields() {
        let lens = generate(&sample_record(), LensType::Card, false);
        let payload = lens.payload().unwrap();
        assert!(payload.contains_key("title"));
        assert!(payload.contains_key("access_hint"));
        assert!(!payload.contains_key("description"));
        assert!(!payload.contains_key("metadata"));
        assert!(!payload.contains_key("price"));
    }

    #[test]
    fn tiers_are_strict_supersets() {
        let rec = sample_record();
        let card_keys: Vec<String> = generate(&rec, LensType::Card, false)
            .payload()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let quick = generate(&rec, LensType::Quickview, false).payload().unwrap();
        let play = generate(&rec, LensType::Playback, false).payload().unwrap();

        for key in &card_keys {
            assert!(quick.contains_key(key), "quickview missing card key {key}");
        }
        for key in quick.keys() {
            assert!(play.contains_key(key), "playback missing quickview key {key}");
        }
        assert!(quick.len() > card_keys.len());
        assert!(play.len() > quick.len());
    }

    #[test]
    fn playback_agrees_with_card_field_for_field() {
        let rec = sample_record();
        let card = generate(&rec, LensType::Card, false).payload().unwrap();
        let play = generate(&rec, LensType::Playback, false).payload().unwrap();
        for (key, value) in &card {
            assert_eq!(play.get(key), Some(value), "mismatch on {key}");
        }
    }

    #[test]
    fn access_hint_owned_wins() {
        let mut rec = sample_record();
        rec.price = Some(0.0);
        let lens = generate(&rec, LensType::Card, true);
        let payload = lens.payload().unwrap();
        assert_eq!(payload["access_hint"], "owned");
    }

    #[test]
    fn access_hint_zero_price_is_free() {
        let mut rec = sample_record();
        rec.price = Some(0.0);
        rec.access_mode = Some("rental".to_owned());
        let payload = generate(&rec, LensType::Card, false).payload().unwrap();
        assert_eq!(payload["access_hint"], "free");
    }

    #[test]
    fn access_hint_from_access_mode() {
        let mut rec = sample_record();
        rec.access_mode = Some("rental".to_owned());
        let payload = generate(&rec, LensType::Card, false).payload().unwrap();
        assert_eq!(payload["access_hint"], "rental");

        rec.access_mode = Some("subscription".to_owned());
        let payload = generate(&rec, LensType::Card, false).payload().unwrap();
        assert_eq!(payload["access_hint"], "subscription");
    }

    #[test]
    fn access_hint_defaults_to_purchase() {
        let rec = CatalogRecord::new("i", "t", "video");
        let payload = generate(&rec, LensType::Card, false).payload().unwrap();
        assert_eq!(payload["access_hint"], "purchase");
    }

    #[test]
    fn missing_optionals_are_absent_not_null() {
        let rec = CatalogRecord::new("i", "t", "book");
        let payload = generate(&rec, LensType::Playback, false).payload().unwrap();
        assert!(!payload.contains_key("description"));
        assert!(!payload.contains_key("art"));
        assert!(!payload.contains_key("tags"));
        assert!(!payload.values().any(Value::is_null));
    }

    #[test]
    fn generation_is_deterministic() {
        let rec = sample_record();
        let a = generate(&rec, LensType::Playback, false).payload().unwrap();
        let b = generate(&rec, LensType::Playback, false).payload().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn payload_has_no_version_field() {
        let payload = generate(&sample_record(), LensType::Card, false)
            .payload()
            .unwrap();
        assert!(!payload.contains_key("version"));
    }
}
