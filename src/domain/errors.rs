//! Domain errors raised while building catalogs and generating workflows

use crate::domain::value_objects::AssetKind;

/// Failures surfaced to the generation loop.
///
/// Missing overrides are not represented here: every lookup
/// across the configuration layers falls back to the template's value.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No base model assets found for category {category}")]
    CatalogEmpty { category: String },
    #[error("No {kind} assets available in category {category}")]
    NoAssets { category: String, kind: AssetKind },
    #[error("No categories configured")]
    NoCategories,
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("{key}: {value} is not a usable weight")]
    InvalidWeight { key: String, value: String },
    #[error("Invalid random range: {value}")]
    InvalidRange { value: String },
    #[error("No path recorded for {kind} asset {name}")]
    MissingAssetPath { kind: AssetKind, name: String },
    #[error("Failed to load category data: {0}")]
    Source(String),
    #[error("Failed to serialize tags: {0}")]
    Serialization(String),
}

impl GenerationError {
    pub(crate) fn invalid_weight(key: impl Into<String>, value: &serde_json::Value) -> Self {
        Self::InvalidWeight {
            key: key.into(),
            value: value.to_string(),
        }
    }

    pub(crate) fn invalid_range(value: &serde_json::Value) -> Self {
        Self::InvalidRange {
            value: value.to_string(),
        }
    }
}
