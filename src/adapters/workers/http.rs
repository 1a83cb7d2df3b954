//! HTTP worker implementation.
//!
//! POSTs `{worker, prompt, model}` as JSON to the configured endpoint and
//! reads the generated text from the `text` (or `output`) field of the reply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::errors::WorkerError;
use crate::domain::models::WorkerHandle;
use crate::domain::ports::Worker;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    worker: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

/// A worker reached over JSON/HTTP.
pub struct HttpWorker {
    handle: WorkerHandle,
    endpoint: String,
    model: Option<String>,
    client: Client,
}

impl HttpWorker {
    /// Create a worker sharing the given client.
    ///
    /// The client carries no timeout; the worker client enforces one per call.
    pub fn new(handle: WorkerHandle, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            handle,
            endpoint: endpoint.into(),
            model: None,
            client,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    async fn generate(&self, prompt: &str) -> Result<String, WorkerError> {
        let body = GenerateRequest {
            worker: &self.handle.id,
            prompt,
            model: self.model.as_deref(),
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let parsed: GenerateResponse = serde_json::from_slice(&bytes)?;
        parsed
            .text
            .or(parsed.output)
            .ok_or_else(|| WorkerError::InvalidResponse("missing `text` field".to_string()))
    }
}
