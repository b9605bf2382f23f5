//! Application configuration

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde_json::Value;

use crate::domain::services::nested_store::deep_merge;
use crate::domain::value_objects::GeneratorSettings;
use crate::infrastructure::category_source::read_yaml;

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Generator settings file (YAML)
    pub settings_file: PathBuf,

    /// ComfyUI server URL
    pub comfyui_base_url: String,

    /// SQLite database holding selection counts
    pub database_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            settings_file: env::var("WILDGEN_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.yml")),

            comfyui_base_url: env::var("COMFYUI_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8188".to_string()),

            database_url: env::var("WILDGEN_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://wildgen.db?mode=rwc".to_string()),
        })
    }
}

/// Read the generator settings: the YAML file, then `WILDGEN__*` environment
/// overrides (`WILDGEN__NO_CHAR_PER=0.2`) merged on top. Relative storage
/// roots are resolved against the file's directory.
///
/// The file goes through serde_yaml so category names keep their case.
pub fn load_settings(path: &Path) -> Result<GeneratorSettings> {
    let mut merged = read_yaml(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;

    let overrides: Value = Config::builder()
        .add_source(
            Environment::with_prefix("WILDGEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read WILDGEN__ overrides")?
        .try_deserialize()
        .context("Invalid WILDGEN__ overrides")?;
    deep_merge(&mut merged, &overrides);

    let mut settings: GeneratorSettings = serde_json::from_value(merged)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;

    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    settings.resolve_paths(base_dir);
    Ok(settings)
}
