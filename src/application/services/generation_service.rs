//! Generation Service - One workflow instance per iteration
//!
//! Each call to [`GenerationService::generate`] reselects whatever the
//! iteration cadence asks for, clones the category's workflow template and
//! wires the selection into it:
//!
//! 1. setup layer defaults and fresh seeds on every node
//! 2. base model into `CheckpointLoaderSimple`
//! 3. `KSampler` inputs, with the base model record as override
//! 4. base model record node sections
//! 5. character into the primary `LoraLoader`
//! 6. one cloned `LoraLoader` per auxiliary overlay, chained ahead of it
//! 7. `SaveImage` file name prefixes
//! 8. composed tags into the prompt nodes

use std::collections::HashMap;

use chrono::Local;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::application::services::catalog_service::CatalogIndex;
use crate::application::services::iteration_cadence::{CadenceLimits, IterationCadence};
use crate::application::services::parameter_resolver::{reseed, ParameterResolver, ValueClass};
use crate::application::services::selection_service::SelectionEngine;
use crate::domain::services::nested_store::{
    deep_merge, get, get_mut, is_truthy, remove, set_create, set_if_exists,
};
use crate::domain::services::tag_composer::{stage, TagComposer, TagPayloads};
use crate::domain::services::weighted_sampler::range_to_count;
use crate::domain::value_objects::{AssetKind, GeneratorSettings, SelectionState};
use crate::domain::GenerationError;

/// Node ids the wiring steps look for in the template
pub mod nodes {
    pub const CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";
    pub const SAMPLER: &str = "KSampler";
    pub const LORA_LOADER: &str = "LoraLoader";
    pub const SAVE_IMAGE_1: &str = "SaveImage1";
    pub const SAVE_IMAGE_2: &str = "SaveImage2";
    pub const POSITIVE_YAML: &str = "PrimitiveStringMultilineP";
    pub const NEGATIVE_YAML: &str = "PrimitiveStringMultilineN";
    pub const POSITIVE_WILDCARD: &str = "positiveWildcard";
    pub const NEGATIVE_WILDCARD: &str = "negativeWildcard";
}

const LORA_RANGE_INPUTS: [&str; 4] = ["strength_model", "strength_clip", "A", "B"];
const LORA_CHOICE_INPUTS: [&str; 2] = ["preset", "block_vector"];

/// A finished workflow instance
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedWorkflow {
    pub iteration: u64,
    pub selection: SelectionState,
    /// Overlays actually wired into the graph, in chain order
    pub applied_overlays: Vec<String>,
    pub workflow: Value,
    pub tags: TagPayloads,
}

impl GeneratedWorkflow {
    pub fn category(&self) -> &str {
        self.selection.category()
    }
}

pub struct GenerationService<R: Rng = StdRng> {
    rng: R,
    engine: SelectionEngine,
    cadence: IterationCadence,
    current: Option<SelectionState>,
    iteration: u64,
}

impl GenerationService<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for GenerationService<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> GenerationService<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            engine: SelectionEngine::new(),
            cadence: IterationCadence::new(),
            current: None,
            iteration: 0,
        }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Loop counters as `current/limit` for base model, character and overlays
    pub fn cadence_status(&self) -> String {
        self.cadence.to_string()
    }

    /// Draw a value from a range setting (used for the host's sleep)
    pub fn draw_range(&mut self, value: &Value) -> Result<u64, GenerationError> {
        Ok(range_to_count(&mut self.rng, value)? as u64)
    }

    /// Produce the next workflow instance
    #[instrument(skip_all, fields(iteration = self.iteration))]
    pub fn generate(
        &mut self,
        catalogs: &HashMap<String, CatalogIndex>,
        settings: &GeneratorSettings,
    ) -> Result<GeneratedWorkflow, GenerationError> {
        let selection = match self.select(catalogs, settings) {
            Ok(selection) => selection,
            Err(e) => {
                self.cadence.reset();
                self.current = None;
                return Err(e);
            }
        };
        let index = catalogs
            .get(selection.category())
            .ok_or_else(|| GenerationError::UnknownCategory(selection.category().to_string()))?;
        dump_layers(index, settings);

        let mut workflow = match index.workflow_template() {
            Some(template) => template.clone(),
            None => {
                warn!(category = %index.category(), "No workflow template, generating an empty graph");
                json!({})
            }
        };

        let applied_overlays = self.wire(&mut workflow, index, &selection, settings)?;
        let tags = self.compose_tags(&mut workflow, index, &selection, &applied_overlays, settings)?;

        if settings.diagnostics.workflow {
            debug!(workflow = %workflow, "Resolved workflow");
        }

        let limits = CadenceLimits {
            base_model: range_to_count(&mut self.rng, &settings.checkpoint_loop)? as u64,
            character: range_to_count(&mut self.rng, &settings.char_loop)? as u64,
            overlays: range_to_count(&mut self.rng, &settings.queue_loop)? as u64,
        };
        self.cadence.finish(limits);

        let generated = GeneratedWorkflow {
            iteration: self.iteration,
            selection: selection.clone(),
            applied_overlays,
            workflow,
            tags,
        };
        self.iteration += 1;
        self.current = Some(selection);
        Ok(generated)
    }

    /// Reuse or reselect each part of the selection as the cadence says
    fn select(
        &mut self,
        catalogs: &HashMap<String, CatalogIndex>,
        settings: &GeneratorSettings,
    ) -> Result<SelectionState, GenerationError> {
        let mut plan = self.cadence.begin();

        let current = self
            .current
            .take()
            .filter(|state| catalogs.contains_key(state.category()));
        if current.is_none() {
            plan.base_model = true;
            plan.character = true;
            plan.overlays = true;
        }

        let base_model = match &current {
            Some(state) if !plan.base_model => state.base_model.clone(),
            _ => self.engine.select_base_model(&mut self.rng, catalogs, settings)?,
        };
        let index = catalogs
            .get(&base_model.category)
            .ok_or_else(|| GenerationError::UnknownCategory(base_model.category.clone()))?;

        let character = match &current {
            Some(state) if !plan.character => state.character.clone(),
            _ => self.engine.select_character(&mut self.rng, index, settings)?,
        };
        let overlays = match &current {
            Some(state) if !plan.overlays => state.overlays.clone(),
            _ => self.engine.select_overlays(&mut self.rng, index, settings)?,
        };

        debug!(
            category = %base_model.category,
            base_model = %base_model.name,
            character = character.name(),
            overlays = ?overlays.names,
            reselected = ?plan,
            "Selection ready"
        );
        Ok(SelectionState {
            base_model,
            character,
            overlays,
        })
    }

    /// Wiring steps 1 to 7. Returns the overlays chained into the graph.
    fn wire(
        &mut self,
        workflow: &mut Value,
        index: &CatalogIndex,
        selection: &SelectionState,
        settings: &GeneratorSettings,
    ) -> Result<Vec<String>, GenerationError> {
        let rng = &mut self.rng;
        let resolver = ParameterResolver::new(index.setup_workflow());
        let empty = json!({});
        let base_record = index.base_model_record(&selection.base_model.name).unwrap_or(&empty);

        // 1. setup defaults
        resolver.apply_defaults(rng, workflow, &settings.exclude_nodes)?;

        // 2. base model
        set_if_exists(
            workflow,
            Value::from(selection.base_model.path.clone()),
            &[nodes::CHECKPOINT_LOADER, "inputs", "ckpt_name"],
        );

        // 3. sampler
        reseed(rng, workflow, nodes::SAMPLER);
        resolver.resolve_node(rng, workflow, nodes::SAMPLER, Some(base_record))?;

        // 4. record node sections
        resolver.apply_record_sections(rng, workflow, base_record)?;

        // 5. character
        let character_defaults = get(index.setup_workflow(), &["charDefault"]).unwrap_or(&empty);
        if let Some(path) = selection.character.path() {
            set_if_exists(workflow, Value::from(path), &[nodes::LORA_LOADER, "inputs", "lora_name"]);
        }
        reseed(rng, workflow, nodes::LORA_LOADER);
        if selection.character.is_none() {
            for input in ["strength_model", "strength_clip"] {
                set_if_exists(workflow, json!(0.0), &[nodes::LORA_LOADER, "inputs", input]);
            }
        } else {
            let record = index.overlay_record(selection.character.name()).unwrap_or(&empty);
            let lookup = |input: &str| lookup_with_default(record, character_defaults, input);
            resolver.apply_lookup(rng, workflow, nodes::LORA_LOADER, &LORA_RANGE_INPUTS, ValueClass::Range, lookup)?;
            resolver.apply_lookup(rng, workflow, nodes::LORA_LOADER, &LORA_CHOICE_INPUTS, ValueClass::Choice, lookup)?;
        }

        // 6. overlays
        let applied = if selection.overlays.skipped {
            Vec::new()
        } else {
            chain_overlays(rng, &resolver, workflow, index, selection)?
        };

        // 7. save image prefixes
        let character_tags = character_tags(index, selection, settings);
        let prefix = format!(
            "{category}/{model}{model_mark}/{character}{character_mark}/{model}-{character}-{stamp}-{iteration}",
            category = selection.category(),
            model = selection.base_model.name,
            model_mark = if is_truthy(base_record) { "+" } else { "" },
            character = selection.character.name(),
            character_mark = if is_truthy(&character_tags) { "+" } else { "" },
            stamp = Local::now().format("%Y%m%d-%H%M%S"),
            iteration = self.iteration,
        );
        set_if_exists(workflow, Value::from(format!("{prefix}-1")), &[nodes::SAVE_IMAGE_1, "inputs", "filename_prefix"]);
        set_if_exists(workflow, Value::from(format!("{prefix}-2")), &[nodes::SAVE_IMAGE_2, "inputs", "filename_prefix"]);
        if settings.no_save_image1 {
            let dropped = remove(workflow, &[nodes::SAVE_IMAGE_1, "inputs", "images"]);
            debug!(dropped = ?dropped, "Detached first image output");
        }

        if settings.diagnostics.set_workflow {
            debug!(workflow = %workflow, "Workflow after wiring");
        }
        Ok(applied)
    }

    /// Step 8: compose the tag stages and write them into the prompt nodes
    fn compose_tags(
        &mut self,
        workflow: &mut Value,
        index: &CatalogIndex,
        selection: &SelectionState,
        applied: &[String],
        settings: &GeneratorSettings,
    ) -> Result<TagPayloads, GenerationError> {
        let mut composer = TagComposer::new(settings.wildcard_order.clone());
        composer.add_stage(stage::SETUP, index.setup_wildcard());
        composer.add_stage(
            stage::BASE_MODEL,
            index.base_model_record(&selection.base_model.name).unwrap_or(&Value::Null),
        );
        composer.add_stage(stage::CHARACTER, &character_tags(index, selection, settings));
        composer.add_stage(stage::OVERLAY_RULES, &selection.overlays.rule_tags);
        composer.add_stage(stage::OVERLAYS, &overlay_tags(index, selection, applied, settings));

        if settings.diagnostics.tag_stages {
            let (positive, negative) = composer.merged();
            debug!(positive = %positive, negative = %negative, "Merged tag stages");
        }

        let tags = composer.compose(&mut self.rng, &settings.shuffle_wildcard)?;
        if settings.diagnostics.shuffle {
            debug!(shuffled = tags.shuffled, "Tag shuffle");
        }
        if settings.diagnostics.tags {
            debug!(positive = %tags.positive_text, negative = %tags.negative_text, "Composed tags");
        }

        set_if_exists(workflow, Value::from(tags.positive_yaml.clone()), &[nodes::POSITIVE_YAML, "inputs", "value"]);
        set_if_exists(workflow, Value::from(tags.negative_yaml.clone()), &[nodes::NEGATIVE_YAML, "inputs", "value"]);
        set_if_exists(workflow, Value::from(tags.positive_text.clone()), &[nodes::POSITIVE_WILDCARD, "inputs", "wildcard_text"]);
        set_if_exists(workflow, Value::from(tags.negative_text.clone()), &[nodes::NEGATIVE_WILDCARD, "inputs", "wildcard_text"]);
        reseed(&mut self.rng, workflow, nodes::POSITIVE_WILDCARD);
        reseed(&mut self.rng, workflow, nodes::NEGATIVE_WILDCARD);

        Ok(tags)
    }
}

fn dump_layers(index: &CatalogIndex, settings: &GeneratorSettings) {
    let flags = &settings.diagnostics;
    if flags.setup_wildcard {
        debug!(category = %index.category(), layer = %index.setup_wildcard(), "setupWildcard");
    }
    if flags.setup_workflow {
        debug!(category = %index.category(), layer = %index.setup_workflow(), "setupWorkflow");
    }
    if flags.base_model_records {
        debug!(category = %index.category(), records = %index.base_model_records(), "Base model records");
    }
    if flags.overlay_records {
        debug!(category = %index.category(), records = %index.overlay_records(), "Overlay records");
    }
}

/// `record[input]`, falling back to `defaults[input]`
fn lookup_with_default(record: &Value, defaults: &Value, input: &str) -> Option<Value> {
    get(record, &[input]).or_else(|| get(defaults, &[input])).cloned()
}

fn character_tags(index: &CatalogIndex, selection: &SelectionState, settings: &GeneratorSettings) -> Value {
    if selection.character.is_none() {
        settings.no_char_wildcard.clone()
    } else {
        index
            .overlay_record(selection.character.name())
            .cloned()
            .unwrap_or_else(|| json!({}))
    }
}

/// Records of the overlays that made it into the workflow
fn overlay_tags(
    index: &CatalogIndex,
    selection: &SelectionState,
    applied: &[String],
    settings: &GeneratorSettings,
) -> Value {
    if selection.overlays.skipped {
        return settings.no_lora_wildcard.clone();
    }
    let mut merged = Value::Object(Map::new());
    for name in applied {
        if let Some(record) = index.overlay_record(name) {
            deep_merge(&mut merged, record);
        }
    }
    merged
}

/// Point the first element of a link input (`[node, slot]`) at `source`
fn relink(workflow: &mut Value, node: &str, input: &str, source: &Value) {
    if let Some(Value::Array(link)) = get_mut(workflow, &[node, "inputs", input]) {
        if let Some(first) = link.first_mut() {
            *first = source.clone();
        }
    }
}

/// Clone the primary LoRA loader once per overlay and splice each clone
/// between the loader's upstream model/clip source and the previous head
fn chain_overlays<R: Rng + ?Sized>(
    rng: &mut R,
    resolver: &ParameterResolver<'_>,
    workflow: &mut Value,
    index: &CatalogIndex,
    selection: &SelectionState,
) -> Result<Vec<String>, GenerationError> {
    let Some(loader) = get(workflow, &[nodes::LORA_LOADER]).cloned() else {
        if !selection.overlays.names.is_empty() {
            warn!("Template has no LoraLoader, overlays are not wired");
        }
        return Ok(Vec::new());
    };

    let upstream = |input: &str| match get(&loader, &["inputs", input]) {
        Some(Value::Array(link)) => link.first().cloned(),
        other => other.cloned(),
    };
    let model_source = upstream("model");
    let clip_source = upstream("clip");

    let empty = json!({});
    let defaults = get(index.setup_workflow(), &["loraDefault"]).unwrap_or(&empty);
    let auxiliaries = index.assets(AssetKind::Auxiliary);

    let mut head = nodes::LORA_LOADER.to_string();
    let mut applied = Vec::new();
    for name in &selection.overlays.names {
        let Some(path) = auxiliaries.path_of(name) else {
            warn!(overlay = %name, "Selected overlay is no longer indexed");
            continue;
        };

        let key = format!("{}-{name}", nodes::LORA_LOADER);
        set_create(workflow, loader.clone(), &[key.as_str()]);
        if let Some(source) = &model_source {
            relink(workflow, &key, "model", source);
        }
        if let Some(source) = &clip_source {
            relink(workflow, &key, "clip", source);
        }

        reseed(rng, workflow, &key);
        set_if_exists(workflow, Value::from(path), &[key.as_str(), "inputs", "lora_name"]);

        let record = index.overlay_record(name).unwrap_or(&empty);
        let lookup = |input: &str| lookup_with_default(record, defaults, input);
        resolver.apply_lookup(rng, workflow, &key, &LORA_RANGE_INPUTS, ValueClass::Range, lookup)?;
        resolver.apply_lookup(rng, workflow, &key, &LORA_CHOICE_INPUTS, ValueClass::Choice, lookup)?;

        let key_value = Value::from(key.clone());
        relink(workflow, &head, "model", &key_value);
        relink(workflow, &head, "clip", &key_value);

        head = key;
        applied.push(name.clone());
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::outbound::testing::InMemoryCategorySource;
    use crate::domain::value_objects::{ChangeKind, RecordSet, SetupLayer, WeightDefaults};

    fn template() -> Value {
        json!({
            "CheckpointLoaderSimple": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "x"}},
            "ModelSamplingDiscrete": {"class_type": "ModelSamplingDiscrete", "inputs": {"model": ["CheckpointLoaderSimple", 0]}},
            "LoraLoader": {"class_type": "LoraLoader", "inputs": {
                "model": ["ModelSamplingDiscrete", 0],
                "clip": ["CheckpointLoaderSimple", 1],
                "lora_name": "placeholder",
                "strength_model": 1.0,
                "strength_clip": 1.0
            }},
            "KSampler": {"class_type": "KSampler", "inputs": {
                "seed": 0, "steps": 20, "cfg": 7.0, "sampler_name": "euler", "model": ["LoraLoader", 0]
            }},
            "SaveImage1": {"class_type": "SaveImage", "inputs": {"images": ["8", 0], "filename_prefix": "a"}},
            "SaveImage2": {"class_type": "SaveImage", "inputs": {"images": ["9", 0], "filename_prefix": "b"}},
            "PrimitiveStringMultilineP": {"inputs": {"value": ""}},
            "PrimitiveStringMultilineN": {"inputs": {"value": ""}},
            "positiveWildcard": {"inputs": {"wildcard_text": "", "seed": 0}},
            "negativeWildcard": {"inputs": {"wildcard_text": "", "seed": 0}}
        })
    }

    fn catalogs() -> HashMap<String, CatalogIndex> {
        let source = InMemoryCategorySource::new()
            .with_assets("pony", AssetKind::BaseModel, &["pony/m1.safetensors"])
            .with_assets("pony", AssetKind::Character, &["pony/char/alice.safetensors"])
            .with_assets("pony", AssetKind::Auxiliary, &["pony/etc/maid.safetensors", "pony/etc/hat.safetensors"])
            .with_records(
                "pony",
                RecordSet::BaseModel,
                json!({"m1": {"steps": [28, 28], "positive": {"style": "anime"}}}),
            )
            .with_records(
                "pony",
                RecordSet::Overlay,
                json!({
                    "alice": {"strength_model": [0.7, 0.7], "positive": {"who": "alice"}},
                    "maid": {"positive": {"outfit": "maid"}},
                    "hat": {"strength_model": 0.3, "positive": {"hat": "hat"}}
                }),
            )
            .with_weights(
                "pony",
                AssetKind::Auxiliary,
                json!({"all": {"per": true, "dic": {
                    "maid": {"per": 1.0, "loras": "maid"},
                    "hat": {"per": 1.0, "loras": "hat"}
                }}}),
            )
            .with_setup("pony", SetupLayer::Wildcard, json!({"positive": {"q": "masterpiece"}}))
            .with_setup(
                "pony",
                SetupLayer::Workflow,
                json!({"loraDefault": {"strength_model": [0.5, 0.5], "strength_clip": [0.4, 0.4]}}),
            )
            .with_template("pony", template());
        let index = CatalogIndex::load(&source, "pony", &WeightDefaults::default()).unwrap();
        HashMap::from([("pony".to_string(), index)])
    }

    fn settings(no_char_per: f64, no_lora_per: f64) -> GeneratorSettings {
        GeneratorSettings {
            checkpoint_types: json!({"pony": 1}).as_object().cloned().unwrap(),
            no_char_per,
            no_lora_per,
            shuffle_wildcard: json!(false),
            ..GeneratorSettings::default()
        }
    }

    #[test]
    fn test_full_wiring_with_character_and_overlays() {
        let catalogs = catalogs();
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(31));
        let generated = service.generate(&catalogs, &settings(0.0, 0.0)).unwrap();
        let wf = &generated.workflow;

        assert_eq!(wf["CheckpointLoaderSimple"]["inputs"]["ckpt_name"], json!("pony/m1.safetensors"));
        assert_eq!(wf["KSampler"]["inputs"]["steps"], json!(28));
        assert_eq!(wf["LoraLoader"]["inputs"]["lora_name"], json!("pony/char/alice.safetensors"));
        assert_eq!(wf["LoraLoader"]["inputs"]["strength_model"], json!(0.7));

        // BTreeSet order: hat, then maid
        assert_eq!(generated.applied_overlays, vec!["hat", "maid"]);
        assert_eq!(wf["LoraLoader"]["inputs"]["model"], json!(["LoraLoader-hat", 0]));
        assert_eq!(wf["LoraLoader-hat"]["inputs"]["model"], json!(["LoraLoader-maid", 0]));
        assert_eq!(wf["LoraLoader-maid"]["inputs"]["model"], json!(["ModelSamplingDiscrete", 0]));
        assert_eq!(wf["LoraLoader-maid"]["inputs"]["clip"], json!(["CheckpointLoaderSimple", 1]));
        assert_eq!(wf["LoraLoader-hat"]["inputs"]["strength_model"], json!(0.3));
        assert_eq!(wf["LoraLoader-maid"]["inputs"]["strength_model"], json!(0.5));
        assert_eq!(wf["LoraLoader-maid"]["inputs"]["lora_name"], json!("pony/etc/maid.safetensors"));

        let prefix = wf["SaveImage1"]["inputs"]["filename_prefix"].as_str().unwrap();
        assert!(prefix.starts_with("pony/m1+/alice+/m1-alice-"));
        assert!(prefix.ends_with("-0-1"));

        let text = wf["positiveWildcard"]["inputs"]["wildcard_text"].as_str().unwrap();
        assert_eq!(text, "/**/,masterpiece,anime,alice,hat,maid,/**/");
        assert!(wf["PrimitiveStringMultilineP"]["inputs"]["value"]
            .as_str()
            .unwrap()
            .contains("who: alice"));
    }

    #[test]
    fn test_no_character_zeroes_strengths_and_skips_overlays() {
        let catalogs = catalogs();
        let mut settings = settings(1.0, 1.0);
        settings.no_char_wildcard = json!({"positive": {"solo": "no humans"}});
        settings.no_save_image1 = true;
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(32));

        let generated = service.generate(&catalogs, &settings).unwrap();
        let wf = &generated.workflow;

        assert!(generated.selection.character.is_none());
        assert_eq!(wf["LoraLoader"]["inputs"]["strength_model"], json!(0.0));
        assert_eq!(wf["LoraLoader"]["inputs"]["lora_name"], json!("pony/char/alice.safetensors"));
        assert!(generated.applied_overlays.is_empty());
        assert!(wf.get("LoraLoader-maid").is_none());
        assert!(wf["SaveImage1"]["inputs"].get("images").is_none());
        assert!(generated.tags.positive_text.contains("no humans"));
        assert!(wf["SaveImage1"]["inputs"]["filename_prefix"]
            .as_str()
            .unwrap()
            .starts_with("pony/m1+/none+/"));
    }

    #[test]
    fn test_template_is_never_mutated() {
        let catalogs = catalogs();
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(33));
        for _ in 0..3 {
            service.generate(&catalogs, &settings(0.0, 0.0)).unwrap();
        }
        assert_eq!(catalogs["pony"].workflow_template(), Some(&template()));
        assert_eq!(service.iteration(), 3);
    }

    #[test]
    fn test_selection_reused_within_overlay_cycle() {
        let catalogs = catalogs();
        let mut settings = settings(0.5, 0.5);
        settings.queue_loop = json!([3, 3]);
        settings.char_loop = json!([3, 3]);
        settings.checkpoint_loop = json!([3, 3]);
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(34));

        let first = service.generate(&catalogs, &settings).unwrap();
        let second = service.generate(&catalogs, &settings).unwrap();
        assert_eq!(first.selection, second.selection);
        assert_ne!(
            first.workflow["KSampler"]["inputs"]["seed"],
            second.workflow["KSampler"]["inputs"]["seed"]
        );
    }

    #[test]
    fn test_failed_selection_resets_cycle() {
        let catalogs = catalogs();
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(35));
        let mut bad = settings(0.0, 0.0);
        bad.checkpoint_types = json!({"missing": 1}).as_object().cloned().unwrap();

        assert!(service.generate(&catalogs, &bad).is_err());
        assert!(service.generate(&catalogs, &settings(0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_unindexed_overlay_contributes_no_tags() {
        let mut catalogs = catalogs();
        let mut settings = settings(0.0, 0.0);
        settings.queue_loop = json!([2, 2]);
        settings.char_loop = json!([2, 2]);
        settings.checkpoint_loop = json!([2, 2]);
        let mut service = GenerationService::with_rng(StdRng::seed_from_u64(36));

        let first = service.generate(&catalogs, &settings).unwrap();
        assert_eq!(first.applied_overlays, vec!["hat", "maid"]);

        catalogs.get_mut("pony").unwrap().apply_asset_change(
            AssetKind::Auxiliary,
            "pony/etc/maid.safetensors",
            ChangeKind::Deleted,
            &WeightDefaults::default(),
        );
        let second = service.generate(&catalogs, &settings).unwrap();

        assert!(second.selection.overlays.names.contains("maid"));
        assert_eq!(second.applied_overlays, vec!["hat"]);
        assert!(second.workflow.get("LoraLoader-maid").is_none());
        assert!(!second.tags.positive_text.contains("maid"));
        assert!(second.tags.positive_text.contains("hat"));
    }
}
