//! Ollama backend
//!
//! Serves the model through a local Ollama server. The uploaded image is read
//! from its scratch file and sent inline as base64.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use super::engine::{EngineError, InferenceEngine, InferenceRequest, RawModelOutput};

/// Ollama inference engine
pub struct OllamaEngine {
    client: reqwest::Client,
    /// Ollama API URL
    base_url: String,
    /// Model tag (e.g., "deepseek-ocr")
    model: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct FailureResponse {
    error: String,
}

impl OllamaEngine {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Ollama lists `name` as `deepseek-ocr:latest` for a bare `deepseek-ocr`
    fn matches_model(&self, name: &str) -> bool {
        name == self.model
            || name
                .strip_prefix(self.model.as_str())
                .is_some_and(|rest| rest.starts_with(':'))
    }

    async fn model_present(&self) -> Result<bool, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.iter().any(|m| self.matches_model(&m.name)))
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn load(&self) -> Result<(), EngineError> {
        if self.model_present().await? {
            return Ok(());
        }

        tracing::info!(model = %self.model, "Model not present in Ollama, pulling");
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": self.model, "stream": false }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        if self.model_present().await? {
            Ok(())
        } else {
            Err(EngineError::NotReady(format!(
                "model {} is not available in Ollama",
                self.model
            )))
        }
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<RawModelOutput, EngineError> {
        let image_data = tokio::fs::read(&request.image_file).await?;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(&image_data);

        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "images": [image_base64],
            "stream": false
        });

        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        let result: GenerateResponse = response.json().await?;
        Ok(RawModelOutput::Text(result.response))
    }
}

/// Map a non-success Ollama response to an error
async fn failure(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<FailureResponse>(&body) {
        Ok(failure) => EngineError::from_failure(failure.error),
        Err(_) => EngineError::Status { status, body },
    }
}
