use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Port for handing finished workflows to the image generation server
#[async_trait]
pub trait SubmissionPort: Send + Sync {
    /// Queue a resolved workflow graph, returning the server's prompt id
    async fn queue_prompt(&self, workflow: &Value) -> Result<String>;

    /// Block until fewer than `max_queue` prompts are pending
    async fn wait_until_idle(&self, max_queue: u32) -> Result<()>;
}
