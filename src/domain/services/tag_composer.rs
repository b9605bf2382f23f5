//! Tag composition
//!
//! Each selection step contributes a record with optional `positive` and
//! `negative` mappings. The composer merges them in the configured stage
//! order and renders two forms per polarity: a YAML dump of the merged
//! mapping and a comma-joined text payload of its values.

use std::collections::HashMap;

use rand::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::errors::GenerationError;
use crate::domain::services::nested_store::{deep_merge, is_truthy};
use crate::domain::services::weighted_sampler::pick_weighted_choice;
use crate::domain::value_objects::Candidate;

/// Literal marker placed at both ends of every text payload
pub const WILDCARD_MARKER: &str = "/**/";

/// Stage names understood by the default ordering
pub mod stage {
    pub const SETUP: &str = "setup";
    pub const BASE_MODEL: &str = "Checkpoint";
    pub const CHARACTER: &str = "Char";
    pub const OVERLAY_RULES: &str = "Weight";
    pub const OVERLAYS: &str = "Lora";
}

/// The composed tag payloads of one iteration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagPayloads {
    pub positive: Value,
    pub negative: Value,
    pub positive_yaml: String,
    pub negative_yaml: String,
    pub positive_text: String,
    pub negative_text: String,
    pub shuffled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TagComposer {
    order: Vec<String>,
    stages: HashMap<String, (Value, Value)>,
}

impl TagComposer {
    pub fn new(order: Vec<String>) -> Self {
        Self {
            order,
            stages: HashMap::new(),
        }
    }

    /// Register a stage record, replacing anything registered under the same
    /// name. Records without `positive`/`negative` contribute nothing.
    pub fn add_stage(&mut self, name: &str, record: &Value) {
        let mut positive = Value::Object(Map::new());
        let mut negative = Value::Object(Map::new());
        if let Some(fields) = record.as_object() {
            if let Some(p) = fields.get("positive") {
                deep_merge(&mut positive, p);
            }
            if let Some(n) = fields.get("negative") {
                deep_merge(&mut negative, n);
            }
        }
        if positive.as_object().is_some_and(Map::is_empty) && negative.as_object().is_some_and(Map::is_empty) {
            tracing::debug!(stage = name, "Tag stage has no payload");
        }
        self.stages.insert(name.to_string(), (positive, negative));
    }

    /// Deep-merge every registered stage in order; later stages win.
    ///
    /// Stages missing from the ordering are ignored.
    pub fn merged(&self) -> (Value, Value) {
        let mut positive = Value::Object(Map::new());
        let mut negative = Value::Object(Map::new());
        for name in &self.order {
            if let Some((p, n)) = self.stages.get(name) {
                deep_merge(&mut positive, p);
                deep_merge(&mut negative, n);
            }
        }
        (positive, negative)
    }

    /// Produce the YAML and text payloads.
    ///
    /// `shuffle` is a candidate (`[false, true]` by default); when it
    /// resolves truthy both text lists are shuffled independently.
    pub fn compose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        shuffle: &Value,
    ) -> Result<TagPayloads, GenerationError> {
        let (positive, negative) = self.merged();

        let positive_yaml = to_yaml(&positive)?;
        let negative_yaml = to_yaml(&negative)?;

        let mut positive_items = text_items(&positive);
        let mut negative_items = text_items(&negative);

        let shuffled = is_truthy(&pick_weighted_choice(rng, Candidate::from(shuffle))?);
        if shuffled {
            positive_items.shuffle(rng);
            negative_items.shuffle(rng);
        }

        Ok(TagPayloads {
            positive_text: positive_items.join(","),
            negative_text: negative_items.join(","),
            positive,
            negative,
            positive_yaml,
            negative_yaml,
            shuffled,
        })
    }
}

fn to_yaml(value: &Value) -> Result<String, GenerationError> {
    serde_yaml::to_string(value).map_err(|e| GenerationError::Serialization(e.to_string()))
}

/// Values of the top-level mapping, framed by the markers
fn text_items(mapping: &Value) -> Vec<String> {
    let mut items = vec![WILDCARD_MARKER.to_string()];
    if let Some(entries) = mapping.as_object() {
        items.extend(entries.values().filter_map(render_leaf));
    }
    items.push(WILDCARD_MARKER.to_string());
    items
}

fn render_leaf(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
