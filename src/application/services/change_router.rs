//! Change Router - Maps file notifications to catalog updates
//!
//! The watcher reports raw paths. The router decides which category and
//! which part of its index a path belongs to, so that the registry only has
//! to apply one scoped action per event.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::application::services::catalog_service::CatalogChange;
use crate::domain::value_objects::{
    AssetKind, ChangeEvent, DataFile, GeneratorSettings, RecordSet, SetupLayer,
};

/// Suffixes of files written by sync tools next to the real data
const IGNORED_SUFFIXES: [&str; 3] = [".ffs_db", ".ffs_lock", ".ffs_tmp"];

/// What a file change means for the generator
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedChange {
    Catalog(CatalogChange),
    Settings,
}

#[derive(Debug, Clone)]
pub struct ChangeRouter {
    settings_file: PathBuf,
    data_root: PathBuf,
    checkpoint_root: PathBuf,
    lora_root: PathBuf,
    char_dir: String,
    etc_dir: String,
    extension: String,
    workflow_file: String,
    categories: Vec<String>,
}

impl ChangeRouter {
    pub fn new(settings_file: impl Into<PathBuf>, settings: &GeneratorSettings) -> Self {
        Self {
            settings_file: settings_file.into(),
            data_root: settings.data_path.clone(),
            checkpoint_root: settings.checkpoint_path.clone(),
            lora_root: settings.lora_path.clone(),
            char_dir: settings.lora_char_dir.clone(),
            etc_dir: settings.lora_etc_dir.clone(),
            extension: settings.asset_extension.clone(),
            workflow_file: settings.workflow_file.clone(),
            categories: settings.categories(),
        }
    }

    /// Directories and files the watcher has to observe
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        vec![
            self.settings_file.clone(),
            self.data_root.clone(),
            self.checkpoint_root.clone(),
            self.lora_root.clone(),
        ]
    }

    /// Follow category additions after a settings reload
    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
    }

    pub fn route(&self, event: &ChangeEvent) -> Option<RoutedChange> {
        let path = event.path.as_path();
        let file_name = path.file_name()?.to_str()?;
        if IGNORED_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
            return None;
        }

        if path == self.settings_file {
            return Some(RoutedChange::Settings);
        }

        let routed = if let Ok(rel) = path.strip_prefix(&self.data_root) {
            self.route_data_file(&parts(rel)?)
        } else if let Ok(rel) = path.strip_prefix(&self.checkpoint_root) {
            self.route_asset(rel, AssetKind::BaseModel, event)
        } else if let Ok(rel) = path.strip_prefix(&self.lora_root) {
            self.route_lora_asset(rel, event)
        } else {
            None
        };

        if routed.is_none() {
            debug!(path = %path.display(), "Ignoring change");
        }
        routed.map(RoutedChange::Catalog)
    }

    fn known(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    fn route_data_file(&self, parts: &[&str]) -> Option<CatalogChange> {
        match parts {
            [file] => SetupLayer::from_file_name(file).map(|layer| CatalogChange::Reload {
                category: None,
                file: DataFile::Setup(layer),
            }),
            [category, file] if self.known(category) => {
                DataFile::from_category_file(file, &self.workflow_file).map(|file| CatalogChange::Reload {
                    category: Some(category.to_string()),
                    file,
                })
            }
            [category, dir, file] if self.known(category) && has_extension(file, "yml") => {
                RecordSet::from_dir_name(dir).map(|set| CatalogChange::Reload {
                    category: Some(category.to_string()),
                    file: DataFile::Records(set),
                })
            }
            _ => None,
        }
    }

    fn route_lora_asset(&self, rel: &Path, event: &ChangeEvent) -> Option<CatalogChange> {
        let parts = parts(rel)?;
        let kind = match parts.get(1) {
            Some(dir) if *dir == self.char_dir => AssetKind::Character,
            Some(dir) if *dir == self.etc_dir => AssetKind::Auxiliary,
            _ => return None,
        };
        self.route_asset(rel, kind, event)
    }

    fn route_asset(&self, rel: &Path, kind: AssetKind, event: &ChangeEvent) -> Option<CatalogChange> {
        let parts = parts(rel)?;
        let [category, .., file] = parts.as_slice() else {
            return None;
        };
        if !self.known(category) || !has_extension(file, &self.extension) {
            return None;
        }
        Some(CatalogChange::Asset {
            category: category.to_string(),
            kind,
            relative_path: parts.join("/"),
            change: event.kind,
        })
    }
}

/// Normal path components as strings; `None` when any is not UTF-8
fn parts(rel: &Path) -> Option<Vec<&str>> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect()
}

fn has_extension(file: &str, extension: &str) -> bool {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
