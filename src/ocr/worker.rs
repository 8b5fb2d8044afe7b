//! Model worker backend
//!
//! Forwards each call to a model-worker sidecar that shares this host's
//! filesystem. The worker reads the image from `image_file`, may write
//! artifacts into `output_path`, and answers with whatever JSON the model
//! produced.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::engine::{EngineError, InferenceEngine, InferenceRequest, RawModelOutput};

/// Model worker inference engine
pub struct WorkerEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct InferBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a InferenceRequest,
}

#[derive(Deserialize)]
struct WorkerHealth {
    #[serde(default)]
    model_loaded: bool,
}

#[derive(Deserialize)]
struct WorkerFailure {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

impl WorkerEngine {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl InferenceEngine for WorkerEngine {
    fn name(&self) -> &str {
        "worker"
    }

    async fn load(&self) -> Result<(), EngineError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        let health: WorkerHealth = response.json().await?;
        if health.model_loaded {
            Ok(())
        } else {
            Err(EngineError::NotReady(format!(
                "worker at {} has not loaded {} yet",
                self.base_url, self.model
            )))
        }
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<RawModelOutput, EngineError> {
        let url = format!("{}/infer", self.base_url);
        let body = InferBody {
            model: &self.model,
            request,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        Ok(response.json().await?)
    }
}

async fn failure(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<WorkerFailure>(&body) {
        Ok(WorkerFailure { error, kind: Some(kind) })
            if kind.to_lowercase().contains("outofmemory") =>
        {
            EngineError::OutOfMemory(error)
        }
        Ok(WorkerFailure { error, .. }) => EngineError::from_failure(error),
        Err(_) => EngineError::Status { status, body },
    }
}
