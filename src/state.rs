//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::ocr::{EngineError, EngineSlot, InferenceEngine, OcrService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    ocr: OcrService,
}

impl AppState {
    /// Create a new application state with an empty engine slot
    pub fn new(config: Config) -> Self {
        Self::with_engine_slot(config, EngineSlot::new())
    }

    pub fn with_engine_slot(config: Config, slot: EngineSlot) -> Self {
        let ocr = OcrService::new(slot).with_scratch_root(config.server.scratch_dir.clone());
        Self {
            inner: Arc::new(AppStateInner { config, ocr }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the OCR service
    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }

    pub fn engine(&self) -> &EngineSlot {
        self.inner.ocr.engine()
    }

    /// Load the engine and install it once ready
    ///
    /// Retries up to `attempts` times, `retry_delay` apart. The slot stays
    /// empty on failure, so OCR requests keep answering 503.
    pub async fn load_engine(
        &self,
        engine: Arc<dyn InferenceEngine>,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<(), EngineError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match engine.load().await {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        engine = engine.name(),
                        attempt,
                        attempts,
                        "Engine not ready: {}, retrying in {:?}",
                        e,
                        retry_delay
                    );
                    attempt += 1;
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(engine = engine.name(), "Model loaded and ready");
        self.engine().install(engine).await;
        Ok(())
    }

    /// Tear down the engine
    ///
    /// This should be called once the server has stopped accepting requests.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        if let Some(engine) = self.engine().take().await {
            engine.shutdown().await;
        }
    }
}
