use async_trait::async_trait;

use crate::domain::value_objects::SelectionState;

#[derive(Debug, thiserror::Error)]
pub enum SelectionLogError {
    #[error("Database error: {0}")]
    Database(String),
}

/// The count tables kept per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountTable {
    BaseModel,
    Character,
    /// Each auxiliary overlay counted on its own
    Overlay,
    /// The sorted set of overlays used together
    OverlaySet,
    /// Base model, character and overlay set together
    Combination,
}

impl CountTable {
    pub const ALL: [CountTable; 5] = [
        Self::BaseModel,
        Self::Character,
        Self::Overlay,
        Self::OverlaySet,
        Self::Combination,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseModel => "base_model",
            Self::Character => "character",
            Self::Overlay => "overlay",
            Self::OverlaySet => "overlay_set",
            Self::Combination => "combination",
        }
    }

    /// The items a selection contributes to this table
    pub fn items(&self, selection: &SelectionState) -> Vec<String> {
        let overlay_set = selection
            .overlays
            .names
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        match self {
            Self::BaseModel => vec![selection.base_model.name.clone()],
            Self::Character => vec![selection.character.name().to_string()],
            Self::Overlay => selection.overlays.names.iter().cloned().collect(),
            Self::OverlaySet => vec![overlay_set],
            Self::Combination => vec![format!(
                "{}|{}|{}",
                selection.base_model.name,
                selection.character.name(),
                overlay_set
            )],
        }
    }
}

/// Port for recording how often each asset was selected
#[async_trait]
pub trait SelectionLogPort: Send + Sync {
    /// Increment every count table for one generated selection
    async fn record(&self, selection: &SelectionState) -> Result<(), SelectionLogError>;

    /// Counts of one table in a category, most used first
    async fn counts(
        &self,
        category: &str,
        table: CountTable,
    ) -> Result<Vec<(String, i64)>, SelectionLogError>;
}
