//! Selection state - what the current iteration runs with

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};

/// Name used for the character slot when no character LoRA is applied
pub const NO_CHARACTER: &str = "none";

/// The chosen checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseModelChoice {
    pub category: String,
    pub name: String,
    pub path: String,
}

/// The chosen character, or the "no character" sentinel.
///
/// The sentinel still carries a path so the LoraLoader node keeps a valid
/// `lora_name`; its strengths are zeroed instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CharacterChoice {
    None { placeholder_path: Option<String> },
    Named { name: String, path: Option<String> },
}

impl CharacterChoice {
    pub fn name(&self) -> &str {
        match self {
            Self::None { .. } => NO_CHARACTER,
            Self::Named { name, .. } => name,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::None { placeholder_path } => placeholder_path.as_deref(),
            Self::Named { path, .. } => path.as_deref(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None { .. })
    }
}

/// The chosen auxiliary overlays and the tags their rules contributed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySelection {
    /// True when the no-overlay coin came up and rules were not consulted
    pub skipped: bool,
    pub names: BTreeSet<String>,
    /// `{positive: {...}, negative: {...}}` merged from the accepted rule candidates
    pub rule_tags: Value,
}

impl OverlaySelection {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            names: BTreeSet::new(),
            rule_tags: json!({}),
        }
    }

    pub fn empty() -> Self {
        Self {
            skipped: false,
            ..Self::skipped()
        }
    }
}

/// Everything chosen for the current selection cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionState {
    pub base_model: BaseModelChoice,
    pub character: CharacterChoice,
    pub overlays: OverlaySelection,
}

impl SelectionState {
    pub fn category(&self) -> &str {
        &self.base_model.category
    }
}
