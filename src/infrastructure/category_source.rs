//! Filesystem category source
//!
//! Layout read by [`FsCategorySource`]:
//!
//! ```text
//! <data>/setupWildcard.yml, setupWorkflow.yml      root layers
//! <data>/<cat>/setup*.yml, Weight*.yml             category layers and weight files
//! <data>/<cat>/workflow_api.json                   workflow template
//! <data>/<cat>/checkpoint/*.yml, lora/*.yml        attribute records
//! <checkpoint root>/<cat>/**/<name>.<ext>          base models
//! <lora root>/<cat>/<char dir>/**/<name>.<ext>     characters
//! <lora root>/<cat>/<etc dir>/**/<name>.<ext>      auxiliary overlays
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::application::ports::outbound::{CategorySourcePort, SourceError};
use crate::domain::services::nested_store::deep_merge;
use crate::domain::value_objects::{AssetKind, DataFile, GeneratorSettings, RecordSet, SetupLayer};

pub struct FsCategorySource {
    data_root: PathBuf,
    checkpoint_root: PathBuf,
    lora_root: PathBuf,
    char_dir: String,
    etc_dir: String,
    extension: String,
    workflow_file: String,
}

impl FsCategorySource {
    pub fn new(settings: &GeneratorSettings) -> Self {
        Self {
            data_root: settings.data_path.clone(),
            checkpoint_root: settings.checkpoint_path.clone(),
            lora_root: settings.lora_path.clone(),
            char_dir: settings.lora_char_dir.clone(),
            etc_dir: settings.lora_etc_dir.clone(),
            extension: settings.asset_extension.clone(),
            workflow_file: settings.workflow_file.clone(),
        }
    }

    fn asset_root(&self, category: &str, kind: AssetKind) -> (PathBuf, &Path) {
        match kind {
            AssetKind::BaseModel => (self.checkpoint_root.join(category), self.checkpoint_root.as_path()),
            AssetKind::Character => (self.lora_root.join(category).join(&self.char_dir), self.lora_root.as_path()),
            AssetKind::Auxiliary => (self.lora_root.join(category).join(&self.etc_dir), self.lora_root.as_path()),
        }
    }

    fn template_candidates(&self, category: &str) -> Vec<PathBuf> {
        let dir = self.data_root.join(category);
        let stem = Path::new(&self.workflow_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.workflow_file);
        vec![
            dir.join(&self.workflow_file),
            dir.join(format!("{stem}.json")),
            dir.join(format!("{stem}.yml")),
        ]
    }
}

impl CategorySourcePort for FsCategorySource {
    fn scan_assets(&self, category: &str, kind: AssetKind) -> Result<Vec<String>, SourceError> {
        let (dir, root) = self.asset_root(category, kind);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), kind = %kind, "Asset directory missing");
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, &self.extension) {
                continue;
            }
            if let Some(relative) = relative_slash_path(path, root) {
                paths.push(relative);
            }
        }
        paths.sort();

        debug!(category, kind = %kind, count = paths.len(), "Scanned assets");
        Ok(paths)
    }

    fn load_setup_layer(&self, category: &str, layer: SetupLayer) -> Result<Value, SourceError> {
        let mut merged = read_yaml(&self.data_root.join(layer.file_name()))?;
        let category_layer = read_yaml(&self.data_root.join(category).join(layer.file_name()))?;
        deep_merge(&mut merged, &category_layer);
        Ok(merged)
    }

    fn load_weight_file(&self, category: &str, kind: AssetKind) -> Result<Value, SourceError> {
        read_yaml(&self.data_root.join(category).join(DataFile::weight_file_name(kind)))
    }

    fn load_attribute_records(&self, category: &str, set: RecordSet) -> Result<Value, SourceError> {
        let dir = self.data_root.join(category).join(set.dir_name());
        let pattern = format!("{}/*.yml", dir.display());
        let entries = glob(&pattern).map_err(|e| SourceError::Parse {
            path: pattern.clone(),
            message: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries.flatten().collect();
        files.sort();

        let mut merged = Value::Object(Map::new());
        for file in &files {
            deep_merge(&mut merged, &read_yaml(file)?);
        }
        debug!(category, set = set.dir_name(), files = files.len(), "Loaded attribute records");
        Ok(merged)
    }

    fn load_workflow_template(&self, category: &str) -> Result<Option<Value>, SourceError> {
        let Some(path) = self.template_candidates(category).into_iter().find(|p| p.is_file()) else {
            warn!(category, file = %self.workflow_file, "Workflow template not found");
            return Ok(None);
        };

        let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let template = if has_extension(&path, "json") {
            serde_json::from_str(&text).map_err(|e| parse_error(&path, e))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| parse_error(&path, e))?
        };
        Ok(Some(template))
    }
}

/// Parse a YAML file into a tree. A missing or empty file is `{}`.
pub(crate) fn read_yaml(path: &Path) -> Result<Value, SourceError> {
    if !path.is_file() {
        return Ok(Value::Object(Map::new()));
    }
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let value: Value = serde_yaml::from_str(&text).map_err(|e| parse_error(path, e))?;
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// `path` relative to `root`, joined with `/` on every platform
fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> SourceError {
    SourceError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> SourceError {
    SourceError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: FsCategorySource,
        root: PathBuf,
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let settings = GeneratorSettings {
            data_path: root.join("data"),
            checkpoint_path: root.join("ckpt"),
            lora_path: root.join("lora"),
            ..GeneratorSettings::default()
        };
        Fixture {
            source: FsCategorySource::new(&settings),
            root,
            _dir: dir,
        }
    }

    #[test]
    fn test_scan_assets_by_kind() {
        let fx = fixture();
        write(&fx.root.join("ckpt/pony/b.safetensors"), "");
        write(&fx.root.join("ckpt/pony/sub/a.safetensors"), "");
        write(&fx.root.join("ckpt/pony/readme.txt"), "");
        write(&fx.root.join("lora/pony/char/alice.safetensors"), "");
        write(&fx.root.join("lora/pony/etc/hat.safetensors"), "");

        assert_eq!(
            fx.source.scan_assets("pony", AssetKind::BaseModel).unwrap(),
            vec!["pony/b.safetensors", "pony/sub/a.safetensors"]
        );
        assert_eq!(
            fx.source.scan_assets("pony", AssetKind::Character).unwrap(),
            vec!["pony/char/alice.safetensors"]
        );
        assert_eq!(
            fx.source.scan_assets("pony", AssetKind::Auxiliary).unwrap(),
            vec!["pony/etc/hat.safetensors"]
        );
        assert!(fx.source.scan_assets("sdxl", AssetKind::BaseModel).unwrap().is_empty());
    }

    #[test]
    fn test_setup_layer_category_wins() {
        let fx = fixture();
        write(
            &fx.root.join("data/setupWildcard.yml"),
            "positive:\n  q: masterpiece\n  style: plain\n",
        );
        write(&fx.root.join("data/pony/setupWildcard.yml"), "positive:\n  style: anime\n");

        let layer = fx.source.load_setup_layer("pony", SetupLayer::Wildcard).unwrap();
        assert_eq!(layer, json!({"positive": {"q": "masterpiece", "style": "anime"}}));

        let empty = fx.source.load_setup_layer("pony", SetupLayer::Workflow).unwrap();
        assert_eq!(empty, json!({}));
    }

    #[test]
    fn test_records_merge_in_file_order() {
        let fx = fixture();
        write(&fx.root.join("data/pony/lora/a.yml"), "alice:\n  weight: 5\n  positive: {who: alice}\n");
        write(&fx.root.join("data/pony/lora/b.yml"), "alice:\n  weight: 7\nhat:\n  positive: {hat: hat}\n");

        let records = fx.source.load_attribute_records("pony", RecordSet::Overlay).unwrap();
        assert_eq!(records["alice"]["weight"], json!(7));
        assert_eq!(records["alice"]["positive"]["who"], json!("alice"));
        assert_eq!(records["hat"]["positive"]["hat"], json!("hat"));
    }

    #[test]
    fn test_weight_file_and_template() {
        let fx = fixture();
        write(&fx.root.join("data/pony/WeightChar.yml"), "alice: 3\n");
        write(&fx.root.join("data/pony/workflow_api.json"), r#"{"KSampler": {"inputs": {"seed": 1}}}"#);

        assert_eq!(
            fx.source.load_weight_file("pony", AssetKind::Character).unwrap(),
            json!({"alice": 3})
        );
        assert_eq!(
            fx.source.load_workflow_template("pony").unwrap(),
            Some(json!({"KSampler": {"inputs": {"seed": 1}}}))
        );
        assert_eq!(fx.source.load_workflow_template("sdxl").unwrap(), None);
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let fx = fixture();
        write(&fx.root.join("data/pony/WeightLora.yml"), "rule: [unclosed\n");

        let err = fx.source.load_weight_file("pony", AssetKind::Auxiliary).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
