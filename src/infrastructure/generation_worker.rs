//! Generation worker - The unattended generation loop
//!
//! One iteration: reload settings, apply pending file changes, generate a
//! workflow, record the selection, submit it and sleep. Watcher events that
//! arrive while sleeping are applied right away.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use crate::application::ports::outbound::SubmissionPort;
use crate::application::services::{
    CatalogRegistry, ChangeRouter, GeneratedWorkflow, GenerationService, RoutedChange,
};
use crate::domain::value_objects::{ChangeEvent, GeneratorSettings};
use crate::infrastructure::config::load_settings;
use crate::infrastructure::state::AppState;
use crate::infrastructure::watcher::ModifiedCoalescer;

/// Applies watcher events to the catalog
pub struct ChangeHandler {
    router: ChangeRouter,
    coalescer: ModifiedCoalescer,
    registry: Arc<CatalogRegistry>,
}

impl ChangeHandler {
    pub fn new(router: ChangeRouter, registry: Arc<CatalogRegistry>) -> Self {
        Self {
            router,
            coalescer: ModifiedCoalescer::new(),
            registry,
        }
    }

    /// Apply one event. Returns true when the settings file changed.
    pub fn handle(&mut self, event: &ChangeEvent, settings: &GeneratorSettings) -> bool {
        if settings.diagnostics.callbacks {
            tracing::debug!(path = %event.path.display(), kind = ?event.kind, "File event");
        }
        if !self.coalescer.accept(event) {
            return false;
        }

        match self.router.route(event) {
            Some(RoutedChange::Catalog(change)) => {
                match self.registry.apply(&change, &settings.weight_defaults()) {
                    Ok(()) => tracing::info!(path = %event.path.display(), kind = ?event.kind, "Catalog updated"),
                    Err(e) => tracing::error!(path = %event.path.display(), "Failed to apply change: {}", e),
                }
                false
            }
            Some(RoutedChange::Settings) => true,
            None => false,
        }
    }

    /// Apply everything already queued without waiting
    pub fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<ChangeEvent>, settings: &GeneratorSettings) {
        while let Ok(event) = events.try_recv() {
            self.handle(&event, settings);
        }
    }

    /// Follow the category list of freshly loaded settings
    pub fn refresh(&mut self, settings: &GeneratorSettings) {
        let categories = settings.categories();
        self.registry.ensure_categories(&categories, &settings.weight_defaults());
        self.router.set_categories(categories);
    }
}

fn summary(generated: &GeneratedWorkflow, cadence: &str) -> String {
    let overlays: Vec<&str> = generated.applied_overlays.iter().map(String::as_str).collect();
    format!(
        "#{} {} | {} | {} | [{}] | {}",
        generated.iteration,
        generated.category(),
        generated.selection.base_model.name,
        generated.selection.character.name(),
        overlays.join(", "),
        cadence
    )
}

/// Queue the workflow, then hold until the server's queue has room again
async fn submit(
    submission: &dyn SubmissionPort,
    generated: &GeneratedWorkflow,
    settings: &GeneratorSettings,
) -> anyhow::Result<()> {
    if !settings.submit_prompt {
        return Ok(());
    }
    let prompt_id = submission.queue_prompt(&generated.workflow).await?;
    tracing::debug!(prompt_id = %prompt_id, "Workflow submitted");
    if settings.wait_queue {
        submission
            .wait_until_idle(settings.max_queue)
            .await
            .context("Failed to read the queue")?;
    }
    Ok(())
}

/// Run until the shutdown flag flips or a fatal error occurs
pub async fn generation_worker(
    state: Arc<AppState>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("Starting generation worker");
    let mut handler = ChangeHandler::new(state.change_router(), state.registry.clone());
    let mut service = GenerationService::new();
    let mut settings = state.settings.clone();

    while !*shutdown.borrow() {
        // Settings are re-read every iteration
        match load_settings(&state.config.settings_file) {
            Ok(fresh) => settings = fresh,
            Err(e) => tracing::warn!("Keeping previous settings: {:#}", e),
        }
        handler.refresh(&settings);
        handler.drain(&mut events, &settings);

        let generated = {
            let catalogs = state.registry.read();
            service.generate(&catalogs, &settings)
        };
        let generated = match generated {
            Ok(generated) => generated,
            Err(e) => {
                tracing::error!("Generation failed: {}", e);
                break;
            }
        };
        tracing::info!("{}", summary(&generated, &service.cadence_status()));

        if let Err(e) = state.selection_log.record(&generated.selection).await {
            tracing::warn!("Failed to record selection counts: {}", e);
        }

        if let Err(e) = submit(state.submission.as_ref(), &generated, &settings).await {
            tracing::error!("Submission failed: {:#}", e);
            break;
        }

        let seconds = match service.draw_range(&settings.sleep) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::warn!("Invalid sleep setting, using 1s: {}", e);
                1
            }
        };
        let deadline = Instant::now() + Duration::from_secs(seconds);
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                Some(event) = events.recv() => {
                    if handler.handle(&event, &settings) {
                        tracing::info!("Settings file changed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    tracing::info!(iterations = service.iteration(), "Generation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::outbound::testing::InMemoryCategorySource;
    use crate::domain::value_objects::{AssetKind, ChangeKind};
    use serde_json::json;
    use std::path::PathBuf;

    fn settings() -> GeneratorSettings {
        GeneratorSettings {
            data_path: PathBuf::from("/srv/data"),
            checkpoint_path: PathBuf::from("/srv/ckpt"),
            lora_path: PathBuf::from("/srv/lora"),
            checkpoint_types: json!({"pony": 1}).as_object().cloned().unwrap(),
            ..GeneratorSettings::default()
        }
    }

    fn handler() -> ChangeHandler {
        let source = InMemoryCategorySource::new()
            .with_assets("pony", AssetKind::BaseModel, &["pony/m1.safetensors"]);
        let settings = settings();
        let registry = CatalogRegistry::build(
            Arc::new(source),
            &settings.categories(),
            &settings.weight_defaults(),
        )
        .unwrap();
        ChangeHandler::new(ChangeRouter::new("/srv/config.yml", &settings), Arc::new(registry))
    }

    #[test]
    fn test_created_asset_reaches_the_index() {
        let mut handler = handler();
        let settings = settings();
        let event = ChangeEvent::new("/srv/ckpt/pony/m2.safetensors", ChangeKind::Created);

        assert!(!handler.handle(&event, &settings));
        assert!(!handler.handle(&event, &settings));

        let catalogs = handler.registry.read();
        let views = catalogs["pony"].assets(AssetKind::BaseModel);
        assert_eq!(views.len(), 2);
        assert_eq!(views.path_of("m2"), Some("pony/m2.safetensors"));
    }

    #[test]
    fn test_settings_change_is_reported() {
        let mut handler = handler();
        let event = ChangeEvent::new("/srv/config.yml", ChangeKind::Modified);
        assert!(handler.handle(&event, &settings()));
    }

    #[tokio::test]
    async fn test_drain_applies_queued_events() {
        let mut handler = handler();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ChangeEvent::new("/srv/ckpt/pony/m1.safetensors", ChangeKind::Deleted)).unwrap();
        tx.send(ChangeEvent::new("/srv/ckpt/pony/m3.safetensors", ChangeKind::Created)).unwrap();

        handler.drain(&mut rx, &settings());

        let catalogs = handler.registry.read();
        assert_eq!(catalogs["pony"].assets(AssetKind::BaseModel).names(), ["m3".to_string()]);
    }

    #[derive(Default)]
    struct RecordingSubmission {
        calls: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait::async_trait]
    impl SubmissionPort for RecordingSubmission {
        async fn queue_prompt(&self, _workflow: &serde_json::Value) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push("queue");
            Ok("prompt-1".to_string())
        }

        async fn wait_until_idle(&self, _max_queue: u32) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("wait");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_queues_before_waiting() {
        let handler = handler();
        let mut settings = settings();
        settings.submit_prompt = true;
        settings.wait_queue = true;
        let generated = {
            let catalogs = handler.registry.read();
            GenerationService::new().generate(&catalogs, &settings).unwrap()
        };

        let submission = RecordingSubmission::default();
        submit(&submission, &generated, &settings).await.unwrap();
        assert_eq!(*submission.calls.lock().unwrap(), vec!["queue", "wait"]);

        settings.submit_prompt = false;
        submit(&submission, &generated, &settings).await.unwrap();
        assert_eq!(submission.calls.lock().unwrap().len(), 2);
    }
}
