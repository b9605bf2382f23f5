//! Asset kinds and the name/path views kept for each of them

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The three kinds of discoverable model files in a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Checkpoint the whole workflow runs on
    BaseModel,
    /// Character LoRA applied through the primary LoraLoader node
    Character,
    /// Auxiliary LoRAs chained after the character
    Auxiliary,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [Self::BaseModel, Self::Character, Self::Auxiliary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseModel => "base_model",
            Self::Character => "character",
            Self::Auxiliary => "auxiliary",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BaseModel => "Base Model",
            Self::Character => "Character",
            Self::Auxiliary => "Auxiliary Overlay",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of an asset as derived from its relative path (the file stem)
pub fn asset_name(relative_path: &str) -> Option<String> {
    Path::new(relative_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// Three parallel views over the assets of one kind.
///
/// `paths_by_name`, `paths` and `names` always describe the same set of
/// files; every mutation goes through [`AssetViews::upsert`] or
/// [`AssetViews::remove`] so the views cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetViews {
    paths_by_name: HashMap<String, String>,
    paths: Vec<String>,
    names: Vec<String>,
}

impl AssetViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the views from relative paths, in scan order
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut views = Self::new();
        for path in paths {
            views.upsert(path.as_ref());
        }
        views
    }

    /// Add an asset, replacing any previous entry with the same name.
    ///
    /// Returns false when the path has no usable file stem.
    pub fn upsert(&mut self, relative_path: &str) -> bool {
        let Some(name) = asset_name(relative_path) else {
            return false;
        };

        if let Some(previous) = self.paths_by_name.insert(name.clone(), relative_path.to_string()) {
            self.paths.retain(|p| p != &previous);
        }
        if !self.paths.iter().any(|p| p == relative_path) {
            self.paths.push(relative_path.to_string());
        }
        if !self.names.contains(&name) {
            self.names.push(name);
        }
        true
    }

    /// Remove an asset from all three views. Returns whether anything changed.
    pub fn remove(&mut self, relative_path: &str) -> bool {
        let Some(name) = asset_name(relative_path) else {
            return false;
        };

        let before = (self.paths_by_name.len(), self.paths.len(), self.names.len());
        self.paths.retain(|p| p != relative_path);
        // A stale path must not evict the file that replaced it under the same name
        if self.path_of(&name) == Some(relative_path) {
            self.paths_by_name.remove(&name);
            self.names.retain(|n| n != &name);
        }
        before != (self.paths_by_name.len(), self.paths.len(), self.names.len())
    }

    pub fn path_of(&self, name: &str) -> Option<&str> {
        self.paths_by_name.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.paths_by_name.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn first_path(&self) -> Option<&str> {
        self.paths.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_name_strips_directories_and_extension() {
        assert_eq!(asset_name("pony/sub/model_a.safetensors").as_deref(), Some("model_a"));
        assert_eq!(asset_name("plain").as_deref(), Some("plain"));
    }

    #[test]
    fn test_upsert_twice_keeps_single_entry() {
        let mut views = AssetViews::new();
        assert!(views.upsert("pony/char/alice.safetensors"));
        assert!(views.upsert("pony/char/alice.safetensors"));

        assert_eq!(views.names(), &["alice".to_string()]);
        assert_eq!(views.paths(), &["pony/char/alice.safetensors".to_string()]);
        assert_eq!(views.path_of("alice"), Some("pony/char/alice.safetensors"));
    }

    #[test]
    fn test_upsert_moved_file_replaces_old_path() {
        let mut views = AssetViews::from_paths(["pony/char/alice.safetensors"]);
        views.upsert("pony/char/new/alice.safetensors");

        assert_eq!(views.len(), 1);
        assert_eq!(views.paths(), &["pony/char/new/alice.safetensors".to_string()]);
    }

    #[test]
    fn test_remove_clears_all_views() {
        let mut views = AssetViews::from_paths(["a/x.safetensors", "a/y.safetensors"]);
        assert!(views.remove("a/x.safetensors"));
        assert!(!views.remove("a/x.safetensors"));

        assert!(!views.contains("x"));
        assert_eq!(views.names(), &["y".to_string()]);
        assert_eq!(views.paths(), &["a/y.safetensors".to_string()]);
        assert_eq!(views.first_path(), Some("a/y.safetensors"));
    }

    #[test]
    fn test_deleting_old_path_after_move_keeps_new_file() {
        let mut views = AssetViews::new();
        views.upsert("a/x.safetensors");
        views.upsert("b/x.safetensors");

        assert!(!views.remove("a/x.safetensors"));

        assert_eq!(views.names(), &["x".to_string()]);
        assert_eq!(views.paths(), &["b/x.safetensors".to_string()]);
        assert_eq!(views.path_of("x"), Some("b/x.safetensors"));
    }
}
