//! ComfyUI client for workflow submission

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::outbound::SubmissionPort;

/// Delay between two queue status polls
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client for ComfyUI API
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    client_id: String,
}

impl ComfyUIClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: Uuid::new_v4().to_string(),
        }
    }

    /// Queue a workflow for execution
    pub async fn queue_prompt(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<QueueResponse, ComfyUIError> {
        let request = QueuePromptRequest {
            prompt: workflow,
            client_id: &self.client_id,
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ComfyUIError::ApiError(error_text));
        }

        let queue_response: QueueResponse = response.json().await?;
        Ok(queue_response)
    }

    /// Current queue state
    pub async fn queue_status(&self) -> Result<QueueStatus, ComfyUIError> {
        let response = self
            .client
            .get(format!("{}/prompt", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ComfyUIError::ApiError(error_text));
        }

        let status: QueueStatus = response.json().await?;
        Ok(status)
    }

    /// Check if the server is available
    pub async fn health_check(&self) -> Result<bool, ComfyUIError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {0}")]
    ApiError(String),
}

#[derive(Debug, Serialize)]
struct QueuePromptRequest<'a> {
    prompt: &'a serde_json::Value,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct QueueResponse {
    pub prompt_id: String,
    #[serde(default)]
    pub number: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub exec_info: ExecInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecInfo {
    #[serde(default)]
    pub queue_remaining: u32,
}

impl QueueStatus {
    /// Whether another prompt may be queued under `max_queue`
    pub fn has_room(&self, max_queue: u32) -> bool {
        self.exec_info.queue_remaining < max_queue
    }
}

// =============================================================================
// SubmissionPort Implementation
// =============================================================================

#[async_trait]
impl SubmissionPort for ComfyUIClient {
    async fn queue_prompt(&self, workflow: &serde_json::Value) -> Result<String> {
        // Call the inherent method using ComfyUIClient:: syntax to avoid recursion
        let response = ComfyUIClient::queue_prompt(self, workflow).await?;
        debug!(prompt_id = %response.prompt_id, number = response.number, "Prompt queued");
        Ok(response.prompt_id)
    }

    async fn wait_until_idle(&self, max_queue: u32) -> Result<()> {
        loop {
            let status = self.queue_status().await?;
            if status.has_room(max_queue) {
                return Ok(());
            }
            debug!(remaining = status.exec_info.queue_remaining, max_queue, "Waiting for queue");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_parsing() {
        let status: QueueStatus =
            serde_json::from_str(r#"{"exec_info": {"queue_remaining": 2}}"#).unwrap();
        assert!(!status.has_room(1));
        assert!(!status.has_room(2));
        assert!(status.has_room(3));

        let empty: QueueStatus = serde_json::from_str("{}").unwrap();
        assert!(empty.has_room(1));
    }

    #[test]
    fn test_queue_request_shape() {
        let workflow = serde_json::json!({"KSampler": {"inputs": {"seed": 1}}});
        let request = QueuePromptRequest {
            prompt: &workflow,
            client_id: "abc",
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["client_id"], "abc");
        assert_eq!(body["prompt"], workflow);
    }
}
