//! Catalog Service - Per-category inventory of assets and data files
//!
//! A [`CatalogIndex`] holds everything the generator knows about one
//! category: the three asset views, the attribute records, the derived
//! weight tables, the setup layers and the workflow template. The
//! [`CatalogRegistry`] owns one index per category behind a single-writer
//! lock and applies change notifications to them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::application::ports::outbound::CategorySourcePort;
use crate::domain::services::nested_store::{get, is_truthy};
use crate::domain::value_objects::{
    AssetKind, AssetViews, ChangeKind, DataFile, OverlayTable, RecordSet, SetupLayer,
    WeightDefaults,
};
use crate::domain::GenerationError;

/// Build a base model or character weight table.
///
/// Every name gets an entry: a truthy `weight` in its attribute record wins,
/// then the persisted table's value, then `default`.
pub fn build_weight_table(
    names: &[String],
    records: &Value,
    persisted: &Value,
    default: f64,
) -> Map<String, Value> {
    names
        .iter()
        .map(|name| {
            let weight = get(records, &[name.as_str(), "weight"])
                .filter(|w| is_truthy(w))
                .or_else(|| get(persisted, &[name.as_str()]))
                .cloned()
                .unwrap_or_else(|| Value::from(default));
            (name.clone(), weight)
        })
        .collect()
}

/// Everything known about one category
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    category: String,
    base_models: AssetViews,
    characters: AssetViews,
    auxiliaries: AssetViews,
    base_model_records: Value,
    overlay_records: Value,
    base_model_weight_file: Value,
    character_weight_file: Value,
    overlay_weight_file: Value,
    base_model_weights: Map<String, Value>,
    character_weights: Map<String, Value>,
    overlay_table: OverlayTable,
    setup_wildcard: Value,
    setup_workflow: Value,
    workflow_template: Option<Value>,
}

impl CatalogIndex {
    /// Scan and load a category from scratch.
    ///
    /// Fails with `CatalogEmpty` when no base model is found.
    #[instrument(skip(source, defaults))]
    pub fn load(
        source: &dyn CategorySourcePort,
        category: &str,
        defaults: &WeightDefaults,
    ) -> Result<Self, GenerationError> {
        let base_models = AssetViews::from_paths(source.scan_assets(category, AssetKind::BaseModel)?);
        if base_models.is_empty() {
            return Err(GenerationError::CatalogEmpty {
                category: category.to_string(),
            });
        }

        let mut index = Self {
            category: category.to_string(),
            base_models,
            characters: AssetViews::from_paths(source.scan_assets(category, AssetKind::Character)?),
            auxiliaries: AssetViews::from_paths(source.scan_assets(category, AssetKind::Auxiliary)?),
            base_model_records: source.load_attribute_records(category, RecordSet::BaseModel)?,
            overlay_records: source.load_attribute_records(category, RecordSet::Overlay)?,
            base_model_weight_file: source.load_weight_file(category, AssetKind::BaseModel)?,
            character_weight_file: source.load_weight_file(category, AssetKind::Character)?,
            overlay_weight_file: source.load_weight_file(category, AssetKind::Auxiliary)?,
            base_model_weights: Map::new(),
            character_weights: Map::new(),
            overlay_table: OverlayTable::default(),
            setup_wildcard: source.load_setup_layer(category, SetupLayer::Wildcard)?,
            setup_workflow: source.load_setup_layer(category, SetupLayer::Workflow)?,
            workflow_template: source.load_workflow_template(category)?,
        };
        index.rebuild_base_model_weights(defaults);
        index.rebuild_character_weights(defaults);
        index.rebuild_overlay_table();

        if index.workflow_template.is_none() {
            warn!(category, "No workflow template found");
        }
        info!(
            category,
            base_models = index.base_models.len(),
            characters = index.characters.len(),
            auxiliaries = index.auxiliaries.len(),
            overlay_rules = index.overlay_table.len(),
            "Catalog loaded"
        );
        Ok(index)
    }

    /// Re-read one data file and refresh whatever derives from it
    pub fn reload(
        &mut self,
        source: &dyn CategorySourcePort,
        file: DataFile,
        defaults: &WeightDefaults,
    ) -> Result<(), GenerationError> {
        let category = self.category.clone();
        match file {
            DataFile::Setup(SetupLayer::Wildcard) => {
                self.setup_wildcard = source.load_setup_layer(&category, SetupLayer::Wildcard)?;
            }
            DataFile::Setup(SetupLayer::Workflow) => {
                self.setup_workflow = source.load_setup_layer(&category, SetupLayer::Workflow)?;
            }
            DataFile::WeightTable(AssetKind::BaseModel) => {
                self.base_model_weight_file = source.load_weight_file(&category, AssetKind::BaseModel)?;
                self.rebuild_base_model_weights(defaults);
            }
            DataFile::WeightTable(AssetKind::Character) => {
                self.character_weight_file = source.load_weight_file(&category, AssetKind::Character)?;
                self.rebuild_character_weights(defaults);
            }
            DataFile::WeightTable(AssetKind::Auxiliary) => {
                self.overlay_weight_file = source.load_weight_file(&category, AssetKind::Auxiliary)?;
                self.rebuild_overlay_table();
            }
            DataFile::Records(RecordSet::BaseModel) => {
                self.base_model_records = source.load_attribute_records(&category, RecordSet::BaseModel)?;
                self.rebuild_base_model_weights(defaults);
            }
            DataFile::Records(RecordSet::Overlay) => {
                self.overlay_records = source.load_attribute_records(&category, RecordSet::Overlay)?;
                self.rebuild_character_weights(defaults);
            }
            DataFile::WorkflowTemplate => {
                self.workflow_template = source.load_workflow_template(&category)?;
            }
        }
        info!(category = %self.category, file = ?file, "Reloaded category data");
        Ok(())
    }

    /// Apply one asset notification. Returns whether the views changed.
    ///
    /// Applying the same notification twice has no further effect.
    pub fn apply_asset_change(
        &mut self,
        kind: AssetKind,
        relative_path: &str,
        change: ChangeKind,
        defaults: &WeightDefaults,
    ) -> bool {
        let views = self.assets_mut(kind);
        let mut changed = false;
        if matches!(change, ChangeKind::Deleted | ChangeKind::Modified) {
            changed |= views.remove(relative_path);
        }
        if matches!(change, ChangeKind::Created | ChangeKind::Modified) {
            let before = views.clone();
            views.upsert(relative_path);
            changed |= *views != before;
        }

        match kind {
            AssetKind::BaseModel => {
                self.rebuild_base_model_weights(defaults);
                if self.base_models.is_empty() {
                    warn!(category = %self.category, "Category has no base models left");
                }
            }
            AssetKind::Character => self.rebuild_character_weights(defaults),
            AssetKind::Auxiliary => self.rebuild_overlay_table(),
        }

        debug!(
            category = %self.category,
            kind = %kind,
            path = relative_path,
            change = ?change,
            changed,
            "Applied asset change"
        );
        changed
    }

    fn rebuild_base_model_weights(&mut self, defaults: &WeightDefaults) {
        self.base_model_weights = build_weight_table(
            self.base_models.names(),
            &self.base_model_records,
            &self.base_model_weight_file,
            defaults.base_model,
        );
    }

    fn rebuild_character_weights(&mut self, defaults: &WeightDefaults) {
        self.character_weights = build_weight_table(
            self.characters.names(),
            &self.overlay_records,
            &self.character_weight_file,
            defaults.character,
        );
    }

    fn rebuild_overlay_table(&mut self) {
        let mut table = OverlayTable::from_value(&self.overlay_weight_file);
        let before = table.len();
        table.prune(self.auxiliaries.names());
        debug!(
            category = %self.category,
            rules = before,
            kept = table.len(),
            "Pruned overlay rules"
        );
        self.overlay_table = table;
    }

    fn assets_mut(&mut self, kind: AssetKind) -> &mut AssetViews {
        match kind {
            AssetKind::BaseModel => &mut self.base_models,
            AssetKind::Character => &mut self.characters,
            AssetKind::Auxiliary => &mut self.auxiliaries,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn assets(&self, kind: AssetKind) -> &AssetViews {
        match kind {
            AssetKind::BaseModel => &self.base_models,
            AssetKind::Character => &self.characters,
            AssetKind::Auxiliary => &self.auxiliaries,
        }
    }

    pub fn base_model_weights(&self) -> &Map<String, Value> {
        &self.base_model_weights
    }

    pub fn character_weights(&self) -> &Map<String, Value> {
        &self.character_weights
    }

    pub fn overlay_table(&self) -> &OverlayTable {
        &self.overlay_table
    }

    /// Attribute record of a base model
    pub fn base_model_record(&self, name: &str) -> Option<&Value> {
        get(&self.base_model_records, &[name])
    }

    /// Attribute record of a character or auxiliary overlay
    pub fn overlay_record(&self, name: &str) -> Option<&Value> {
        get(&self.overlay_records, &[name])
    }

    pub fn base_model_records(&self) -> &Value {
        &self.base_model_records
    }

    pub fn overlay_records(&self) -> &Value {
        &self.overlay_records
    }

    pub fn setup_wildcard(&self) -> &Value {
        &self.setup_wildcard
    }

    pub fn setup_workflow(&self) -> &Value {
        &self.setup_workflow
    }

    pub fn workflow_template(&self) -> Option<&Value> {
        self.workflow_template.as_ref()
    }
}

/// A change to apply to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogChange {
    Asset {
        category: String,
        kind: AssetKind,
        relative_path: String,
        change: ChangeKind,
    },
    /// Reload a data file; `None` means the root layer shared by every category
    Reload {
        category: Option<String>,
        file: DataFile,
    },
}

/// All category indices, behind a single-writer lock
pub struct CatalogRegistry {
    source: Arc<dyn CategorySourcePort>,
    indices: RwLock<HashMap<String, CatalogIndex>>,
}

impl CatalogRegistry {
    /// Load every configured category
    pub fn build(
        source: Arc<dyn CategorySourcePort>,
        categories: &[String],
        defaults: &WeightDefaults,
    ) -> Result<Self, GenerationError> {
        if categories.is_empty() {
            return Err(GenerationError::NoCategories);
        }

        let mut indices = HashMap::with_capacity(categories.len());
        for category in categories {
            let index = CatalogIndex::load(source.as_ref(), category, defaults)?;
            indices.insert(category.clone(), index);
        }

        Ok(Self {
            source,
            indices: RwLock::new(indices),
        })
    }

    /// Shared read access for one iteration
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CatalogIndex>> {
        self.indices.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply one change under the write lock
    pub fn apply(&self, change: &CatalogChange, defaults: &WeightDefaults) -> Result<(), GenerationError> {
        let mut indices = self.indices.write().unwrap_or_else(|e| e.into_inner());
        match change {
            CatalogChange::Asset {
                category,
                kind,
                relative_path,
                change,
            } => {
                let index = indices
                    .get_mut(category)
                    .ok_or_else(|| GenerationError::UnknownCategory(category.clone()))?;
                index.apply_asset_change(*kind, relative_path, *change, defaults);
            }
            CatalogChange::Reload {
                category: Some(category),
                file,
            } => {
                let index = indices
                    .get_mut(category)
                    .ok_or_else(|| GenerationError::UnknownCategory(category.clone()))?;
                index.reload(self.source.as_ref(), *file, defaults)?;
            }
            CatalogChange::Reload { category: None, file } => {
                for index in indices.values_mut() {
                    index.reload(self.source.as_ref(), *file, defaults)?;
                }
            }
        }
        Ok(())
    }

    /// Load categories that appeared in the settings since the last call.
    ///
    /// Categories that fail to load are logged and left out.
    pub fn ensure_categories(&self, categories: &[String], defaults: &WeightDefaults) {
        let missing: Vec<&String> = {
            let indices = self.read();
            categories.iter().filter(|c| !indices.contains_key(*c)).collect()
        };

        for category in missing {
            match CatalogIndex::load(self.source.as_ref(), category, defaults) {
                Ok(index) => {
                    self.indices
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(category.clone(), index);
                }
                Err(e) => warn!(category = %category, error = %e, "Failed to load new category"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::outbound::testing::InMemoryCategorySource;
    use serde_json::json;

    fn sample_source() -> InMemoryCategorySource {
        InMemoryCategorySource::new()
            .with_assets("pony", AssetKind::BaseModel, &["pony/m1.safetensors", "pony/m2.safetensors", "pony/m3.safetensors"])
            .with_assets("pony", AssetKind::Character, &["pony/char/alice.safetensors", "pony/char/bob.safetensors"])
            .with_assets("pony", AssetKind::Auxiliary, &["pony/etc/maid_v1.safetensors"])
            .with_records("pony", RecordSet::BaseModel, json!({"m1": {"weight": 5}, "m2": {"weight": 0}}))
            .with_weights("pony", AssetKind::BaseModel, json!({"m2": 7}))
            .with_weights(
                "pony",
                AssetKind::Auxiliary,
                json!({"outfits": {"weight": true, "dic": {
                    "maid": {"weight": 1, "loras": "maid_v1"},
                    "nurse": {"weight": 1, "loras": "nurse_v1"}
                }}}),
            )
    }

    #[test]
    fn test_weight_table_layers() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let records = json!({"a": {"weight": 3}, "b": {"weight": 0}});
        let persisted = json!({"b": 9, "a": 1});

        let table = build_weight_table(&names, &records, &persisted, 150.0);
        assert_eq!(table.get("a"), Some(&json!(3)));
        assert_eq!(table.get("b"), Some(&json!(9)));
        assert_eq!(table.get("c"), Some(&json!(150.0)));
    }

    #[test]
    fn test_load_builds_tables_and_prunes_overlays() {
        let source = sample_source();
        let index = CatalogIndex::load(&source, "pony", &WeightDefaults::default()).unwrap();

        assert_eq!(index.assets(AssetKind::BaseModel).len(), 3);
        assert_eq!(index.base_model_weights().get("m1"), Some(&json!(5)));
        assert_eq!(index.base_model_weights().get("m2"), Some(&json!(7)));
        assert_eq!(index.base_model_weights().get("m3"), Some(&json!(150.0)));
        assert_eq!(index.character_weights().len(), 2);

        let rule = &index.overlay_table().rules()[0].1;
        assert_eq!(rule.candidates.len(), 1);
        assert!(rule.candidate("maid").is_some());
    }

    #[test]
    fn test_load_without_base_models_is_catalog_empty() {
        let source = InMemoryCategorySource::new()
            .with_assets("empty", AssetKind::Character, &["empty/char/a.safetensors"]);
        let err = CatalogIndex::load(&source, "empty", &WeightDefaults::default()).unwrap_err();
        assert!(matches!(err, GenerationError::CatalogEmpty { category } if category == "empty"));
    }

    #[test]
    fn test_created_event_twice_is_idempotent() {
        let source = sample_source();
        let defaults = WeightDefaults::default();
        let mut index = CatalogIndex::load(&source, "pony", &defaults).unwrap();

        let path = "pony/char/carol.safetensors";
        assert!(index.apply_asset_change(AssetKind::Character, path, ChangeKind::Created, &defaults));
        assert!(!index.apply_asset_change(AssetKind::Character, path, ChangeKind::Created, &defaults));

        let views = index.assets(AssetKind::Character);
        assert_eq!(views.names().iter().filter(|n| n.as_str() == "carol").count(), 1);
        assert_eq!(views.paths().iter().filter(|p| p.as_str() == path).count(), 1);
        assert_eq!(views.path_of("carol"), Some(path));
        assert!(index.character_weights().contains_key("carol"));
    }

    #[test]
    fn test_modified_and_deleted_events() {
        let source = sample_source();
        let defaults = WeightDefaults::default();
        let mut index = CatalogIndex::load(&source, "pony", &defaults).unwrap();

        index.apply_asset_change(AssetKind::BaseModel, "pony/m3.safetensors", ChangeKind::Modified, &defaults);
        assert_eq!(index.assets(AssetKind::BaseModel).len(), 3);

        index.apply_asset_change(AssetKind::BaseModel, "pony/m3.safetensors", ChangeKind::Deleted, &defaults);
        assert!(!index.assets(AssetKind::BaseModel).contains("m3"));
        assert!(!index.base_model_weights().contains_key("m3"));
    }

    #[test]
    fn test_auxiliary_change_reprunes_overlay_table() {
        let source = sample_source();
        let defaults = WeightDefaults::default();
        let mut index = CatalogIndex::load(&source, "pony", &defaults).unwrap();

        index.apply_asset_change(AssetKind::Auxiliary, "pony/etc/nurse_v1.safetensors", ChangeKind::Created, &defaults);
        assert_eq!(index.overlay_table().rules()[0].1.candidates.len(), 2);

        index.apply_asset_change(AssetKind::Auxiliary, "pony/etc/maid_v1.safetensors", ChangeKind::Deleted, &defaults);
        index.apply_asset_change(AssetKind::Auxiliary, "pony/etc/nurse_v1.safetensors", ChangeKind::Deleted, &defaults);
        assert!(index.overlay_table().is_empty());
    }

    #[test]
    fn test_registry_reload_and_unknown_category() {
        let source = Arc::new(sample_source());
        let defaults = WeightDefaults::default();
        let registry = CatalogRegistry::build(source.clone(), &["pony".to_string()], &defaults).unwrap();

        source
            .weights
            .write()
            .unwrap()
            .insert(("pony".to_string(), AssetKind::BaseModel), json!({"m3": 42}));
        registry
            .apply(
                &CatalogChange::Reload {
                    category: Some("pony".to_string()),
                    file: DataFile::WeightTable(AssetKind::BaseModel),
                },
                &defaults,
            )
            .unwrap();
        assert_eq!(registry.read()["pony"].base_model_weights().get("m3"), Some(&json!(42)));

        let err = registry
            .apply(
                &CatalogChange::Asset {
                    category: "sdxl".to_string(),
                    kind: AssetKind::BaseModel,
                    relative_path: "sdxl/x.safetensors".to_string(),
                    change: ChangeKind::Created,
                },
                &defaults,
            )
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnknownCategory(_)));
    }

    #[test]
    fn test_registry_requires_categories() {
        let source = Arc::new(sample_source());
        assert!(matches!(
            CatalogRegistry::build(source, &[], &WeightDefaults::default()),
            Err(GenerationError::NoCategories)
        ));
    }
}
