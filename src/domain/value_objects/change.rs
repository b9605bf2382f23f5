//! File change notifications and the data files they can refer to

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::AssetKind;

/// What happened to a watched file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A single notification from the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Shared setup layers, merged from the data root and the category directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupLayer {
    /// Base tags (`setupWildcard.yml`)
    Wildcard,
    /// Workflow overrides, scales, bounds and LoRA defaults (`setupWorkflow.yml`)
    Workflow,
}

impl SetupLayer {
    pub const ALL: [SetupLayer; 2] = [Self::Wildcard, Self::Workflow];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Wildcard => "setupWildcard.yml",
            Self::Workflow => "setupWorkflow.yml",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|layer| layer.file_name() == name)
    }
}

/// Directories of per-asset attribute fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordSet {
    /// `checkpoint/*.yml`, keyed by base model name
    BaseModel,
    /// `lora/*.yml`, keyed by character or auxiliary overlay name
    Overlay,
}

impl RecordSet {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::BaseModel => "checkpoint",
            Self::Overlay => "lora",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        [Self::BaseModel, Self::Overlay]
            .into_iter()
            .find(|set| set.dir_name() == name)
    }
}

/// Every kind of per-category configuration file.
///
/// Each kind maps to exactly one reload action on the category's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFile {
    Setup(SetupLayer),
    WeightTable(AssetKind),
    Records(RecordSet),
    WorkflowTemplate,
}

impl DataFile {
    /// File name of a weight table inside the category directory
    pub fn weight_file_name(kind: AssetKind) -> &'static str {
        match kind {
            AssetKind::BaseModel => "WeightCheckpoint.yml",
            AssetKind::Character => "WeightChar.yml",
            AssetKind::Auxiliary => "WeightLora.yml",
        }
    }

    /// Classify a file directly inside a category directory
    pub fn from_category_file(name: &str, workflow_file: &str) -> Option<Self> {
        if let Some(layer) = SetupLayer::from_file_name(name) {
            return Some(Self::Setup(layer));
        }
        if let Some(kind) = AssetKind::ALL
            .into_iter()
            .find(|kind| Self::weight_file_name(*kind) == name)
        {
            return Some(Self::WeightTable(kind));
        }
        let template_stem = std::path::Path::new(workflow_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(workflow_file);
        if name == workflow_file
            || name == format!("{template_stem}.json")
            || name == format!("{template_stem}.yml")
        {
            return Some(Self::WorkflowTemplate);
        }
        None
    }
}
