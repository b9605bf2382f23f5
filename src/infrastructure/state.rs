//! Shared application state

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::application::ports::outbound::{SelectionLogPort, SubmissionPort};
use crate::application::services::{CatalogRegistry, ChangeRouter};
use crate::domain::value_objects::GeneratorSettings;
use crate::infrastructure::category_source::FsCategorySource;
use crate::infrastructure::comfyui::ComfyUIClient;
use crate::infrastructure::config::{load_settings, AppConfig};
use crate::infrastructure::persistence::SqliteSelectionLog;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    /// Settings as of startup; the worker reloads its own copy every iteration
    pub settings: GeneratorSettings,
    pub registry: Arc<CatalogRegistry>,
    pub comfyui_client: Arc<ComfyUIClient>,
    pub submission: Arc<dyn SubmissionPort>,
    pub selection_log: Arc<dyn SelectionLogPort>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let settings = load_settings(&config.settings_file)?;

        // Build the category indices from the filesystem
        let source = Arc::new(FsCategorySource::new(&settings));
        let registry = CatalogRegistry::build(source, &settings.categories(), &settings.weight_defaults())
            .context("Failed to build the category catalog")?;

        // Initialize ComfyUI client
        let comfyui_client = Arc::new(ComfyUIClient::new(&config.comfyui_base_url));

        // Initialize selection counts
        let pool = SqlitePool::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open {}", config.database_url))?;
        let selection_log = SqliteSelectionLog::new(pool)
            .await
            .context("Failed to prepare the selection counts table")?;

        Ok(Self {
            config,
            settings,
            registry: Arc::new(registry),
            submission: comfyui_client.clone(),
            comfyui_client,
            selection_log: Arc::new(selection_log),
        })
    }

    /// Router for the paths configured at startup
    pub fn change_router(&self) -> ChangeRouter {
        ChangeRouter::new(self.config.settings_file.clone(), &self.settings)
    }
}
