//! Generator settings value object
//!
//! Settings are read from the YAML settings file (see
//! `infrastructure::config::load_settings`) and re-read every iteration, so
//! probabilities and toggles can be tuned while the loop runs. Every field
//! has a default; an empty settings file only needs `checkpoint_types` and
//! the three storage roots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Booleans that only gate diagnostic dumps at debug level
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticFlags {
    pub setup_wildcard: bool,
    pub setup_workflow: bool,
    pub base_model_records: bool,
    pub overlay_records: bool,
    pub overlay_selection: bool,
    pub set_workflow: bool,
    pub tag_stages: bool,
    pub shuffle: bool,
    pub tags: bool,
    pub workflow: bool,
    pub callbacks: bool,
}

/// All tunables of the generator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    // Storage roots
    pub data_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub lora_path: PathBuf,
    pub lora_char_dir: String,
    pub lora_etc_dir: String,
    pub asset_extension: String,
    pub workflow_file: String,

    // Categories and their weights
    pub checkpoint_types: Map<String, Value>,
    /// `<category>/<file>` used for the very first base model
    pub safetensors_start: Option<String>,

    // Probabilities
    pub checkpoint_weight_per: f64,
    pub char_weight_per: f64,
    pub no_char_per: f64,
    pub no_lora_per: f64,
    pub shuffle_wildcard: Value,

    // Default weights for assets missing from every weight source
    pub checkpoint_weight_default: f64,
    pub char_weight_default: f64,

    // Workflow shaping
    pub wildcard_order: Vec<String>,
    pub exclude_nodes: Vec<String>,
    pub no_char_wildcard: Value,
    pub no_lora_wildcard: Value,
    pub no_save_image1: bool,

    // Loop cadence (ranges)
    pub checkpoint_loop: Value,
    pub char_loop: Value,
    pub queue_loop: Value,
    pub sleep: Value,

    // Submission
    pub submit_prompt: bool,
    pub wait_queue: bool,
    pub max_queue: u32,

    pub diagnostics: DiagnosticFlags,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            checkpoint_path: PathBuf::from("models/checkpoints"),
            lora_path: PathBuf::from("models/loras"),
            lora_char_dir: "char".to_string(),
            lora_etc_dir: "etc".to_string(),
            asset_extension: "safetensors".to_string(),
            workflow_file: "workflow_api.json".to_string(),
            checkpoint_types: Map::new(),
            safetensors_start: None,
            checkpoint_weight_per: 0.5,
            char_weight_per: 0.5,
            no_char_per: 0.5,
            no_lora_per: 0.5,
            shuffle_wildcard: json!([false, true]),
            checkpoint_weight_default: 150.0,
            char_weight_default: 150.0,
            wildcard_order: ["setup", "Checkpoint", "Char", "Weight", "Lora"]
                .into_iter()
                .map(String::from)
                .collect(),
            exclude_nodes: Vec::new(),
            no_char_wildcard: json!({}),
            no_lora_wildcard: json!({}),
            no_save_image1: false,
            checkpoint_loop: json!([1, 1]),
            char_loop: json!([1, 1]),
            queue_loop: json!([1, 1]),
            sleep: json!(1),
            submit_prompt: true,
            wait_queue: true,
            max_queue: 1,
            diagnostics: DiagnosticFlags::default(),
        }
    }
}

impl GeneratorSettings {
    /// Category names in settings order
    pub fn categories(&self) -> Vec<String> {
        self.checkpoint_types.keys().cloned().collect()
    }

    /// Make the storage roots absolute against the settings file's directory
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [&mut self.data_path, &mut self.checkpoint_path, &mut self.lora_path] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }

    pub fn weight_defaults(&self) -> WeightDefaults {
        WeightDefaults {
            base_model: self.checkpoint_weight_default,
            character: self.char_weight_default,
        }
    }
}

/// Fallback weights used when building base model and character tables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightDefaults {
    pub base_model: f64,
    pub character: f64,
}

impl Default for WeightDefaults {
    fn default() -> Self {
        GeneratorSettings::default().weight_defaults()
    }
}
