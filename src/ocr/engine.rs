//! Inference Engine
//!
//! Defines the boundary to the model-serving backend and the shapes it may
//! return. Backends live in `ollama` and `worker`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::prompt::Instruction;
use super::types::{OcrError, RequestOptions};

/// Inference engine trait
///
/// One instance lives for the whole process and is shared by concurrent
/// requests. Implementations provide their own thread safety.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Make the model ready to serve. Called once at startup, possibly retried.
    async fn load(&self) -> Result<(), EngineError>;

    /// Run the model on one image
    async fn infer(&self, request: &InferenceRequest) -> Result<RawModelOutput, EngineError>;

    /// Release backend resources. Called once at shutdown.
    async fn shutdown(&self) {}
}

/// Arguments for a single inference call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceRequest {
    pub prompt: String,
    /// Uploaded image, written to a scratch file
    pub image_file: PathBuf,
    /// Scratch directory the engine may write artifacts into
    pub output_path: PathBuf,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    pub test_compress: bool,
    /// Always false: artifacts must not outlive the call
    pub save_results: bool,
    /// Always true: evaluation, not training
    pub eval_mode: bool,
}

impl InferenceRequest {
    pub fn new(
        instruction: &Instruction,
        image_file: &Path,
        output_path: &Path,
        options: &RequestOptions,
    ) -> Self {
        Self {
            prompt: instruction.as_str().to_string(),
            image_file: image_file.to_path_buf(),
            output_path: output_path.to_path_buf(),
            base_size: options.base_size,
            image_size: options.image_size,
            crop_mode: options.crop_mode,
            test_compress: options.test_compress,
            save_results: false,
            eval_mode: true,
        }
    }
}

/// Whatever the engine handed back
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawModelOutput {
    Text(String),
    /// A record with a `text` field; other fields are ignored
    Record { text: Value },
    /// Fragments to be joined by newlines
    Fragments(Vec<Value>),
    Other(Value),
}

impl RawModelOutput {
    /// Plain trimmed text. Unknown shapes normalize to an empty string.
    pub fn normalize(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Record { text } => value_text(text).trim().to_string(),
            Self::Fragments(fragments) => fragments
                .iter()
                .map(value_text)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
            Self::Other(_) => String::new(),
        }
    }
}

impl Default for RawModelOutput {
    fn default() -> Self {
        Self::Other(Value::Null)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Engine error types
///
/// Display is the bare message; `kind()` names the failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    NotReady(String),

    #[error("{0}")]
    OutOfMemory(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Timeout(String),

    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    InvalidResponse(String),

    /// Runtime failure reported by the model itself
    #[error("{0}")]
    Model(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable failure name, surfaced to callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotReady(_) => "NotReady",
            Self::OutOfMemory(_) => "OutOfMemory",
            Self::Connection(_) => "Connection",
            Self::Timeout(_) => "Timeout",
            Self::Status { .. } => "Status",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Model(_) => "Model",
            Self::Io(_) => "Io",
        }
    }

    /// Classify a failure message reported by a backend
    pub fn from_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_lowercase().contains("out of memory") {
            Self::OutOfMemory(message)
        } else {
            Self::Model(message)
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<EngineError> for OcrError {
    fn from(err: EngineError) -> Self {
        OcrError::inference(err.kind(), err)
    }
}

/// Process-wide engine handle
///
/// Empty until the engine finishes loading and again after shutdown.
/// Callers clone the engine out, so no lock is held during inference.
#[derive(Clone, Default)]
pub struct EngineSlot {
    inner: Arc<RwLock<Option<Arc<dyn InferenceEngine>>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that is ready from the start
    pub fn with_engine(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(engine))),
        }
    }

    pub async fn install(&self, engine: Arc<dyn InferenceEngine>) {
        *self.inner.write().await = Some(engine);
    }

    /// The engine, if loaded
    pub async fn current(&self) -> Option<Arc<dyn InferenceEngine>> {
        self.inner.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Empty the slot, returning the engine for teardown
    pub async fn take(&self) -> Option<Arc<dyn InferenceEngine>> {
        self.inner.write().await.take()
    }
}

/// Scripted engine for testing
#[cfg(test)]
pub struct MockEngine {
    pub response: std::sync::Mutex<Option<Result<RawModelOutput, EngineError>>>,
    pub artifact: Option<String>,
    pub calls: std::sync::Mutex<Vec<InferenceRequest>>,
}

#[cfg(test)]
impl MockEngine {
    pub fn returning(output: RawModelOutput) -> Self {
        Self {
            response: std::sync::Mutex::new(Some(Ok(output))),
            artifact: None,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: EngineError) -> Self {
        Self {
            response: std::sync::Mutex::new(Some(Err(err))),
            artifact: None,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_artifact(mut self, contents: &str) -> Self {
        self.artifact = Some(contents.to_string());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl InferenceEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<RawModelOutput, EngineError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(contents) = &self.artifact {
            std::fs::write(request.output_path.join("result.mmd"), contents)?;
        }
        self.response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(RawModelOutput::default()))
    }
}

/// Serve `router` on an ephemeral local port, returning its base URL
#[cfg(test)]
pub async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
