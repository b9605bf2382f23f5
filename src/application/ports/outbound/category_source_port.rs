//! Category source port - Where per-category assets and data files come from

use serde_json::Value;

use crate::domain::value_objects::{AssetKind, RecordSet, SetupLayer};
use crate::domain::GenerationError;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

impl From<SourceError> for GenerationError {
    fn from(err: SourceError) -> Self {
        GenerationError::Source(err.to_string())
    }
}

/// Read access to one installation's assets and configuration files.
///
/// Every loader is total with respect to missing files: an absent file is
/// an empty mapping (or `None` for the template), never an error. Errors
/// are reserved for unreadable or unparsable files.
pub trait CategorySourcePort: Send + Sync {
    /// Relative paths of every asset of `kind` in `category`, in a stable order
    fn scan_assets(&self, category: &str, kind: AssetKind) -> Result<Vec<String>, SourceError>;

    /// Root layer deep-merged with the category layer (category wins)
    fn load_setup_layer(&self, category: &str, layer: SetupLayer) -> Result<Value, SourceError>;

    /// The persisted weight file for `kind`
    fn load_weight_file(&self, category: &str, kind: AssetKind) -> Result<Value, SourceError>;

    /// All attribute fragments of a record set, deep-merged in file name order
    fn load_attribute_records(&self, category: &str, set: RecordSet) -> Result<Value, SourceError>;

    /// The category's workflow template, if any
    fn load_workflow_template(&self, category: &str) -> Result<Option<Value>, SourceError>;
}
