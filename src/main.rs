//! DeepSeek OCR Server
//!
//! Serves the OCR model over HTTP. The listener comes up immediately; the
//! engine loads in the background and requests answer 503 until it is ready.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deepseek_ocr_server::config::{Config, EngineBackend};
use deepseek_ocr_server::ocr::{InferenceEngine, OllamaEngine, WorkerEngine};
use deepseek_ocr_server::routes;
use deepseek_ocr_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "deepseek_ocr_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    // Unset variables take defaults; malformed ones stop startup
    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("Starting DeepSeek OCR Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model: {}", config.model.name);
    tracing::info!("Engine: {:?} at {}", config.engine.backend, config.engine.url);

    std::fs::create_dir_all(&config.model.cache_dir).with_context(|| {
        format!("failed to create model cache dir {}", config.model.cache_dir.display())
    })?;

    let engine = build_engine(&config)?;
    let app_state = AppState::new(config.clone());

    // Load the model without blocking the listener
    let loader_state = app_state.clone();
    let engine_config = config.engine.clone();
    let loader = tokio::spawn(async move {
        if let Err(e) = loader_state
            .load_engine(engine, engine_config.load_attempts, engine_config.load_retry())
            .await
        {
            tracing::error!(kind = e.kind(), "Failed to load model: {}", e);
        }
    });

    let app = routes::router(app_state.clone());

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("DeepSeek OCR Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    loader.abort();
    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

fn build_engine(config: &Config) -> anyhow::Result<Arc<dyn InferenceEngine>> {
    let engine: Arc<dyn InferenceEngine> = match config.engine.backend {
        EngineBackend::Ollama => Arc::new(OllamaEngine::new(
            &config.engine.url,
            &config.model.name,
            config.engine.timeout(),
        )?),
        EngineBackend::Worker => Arc::new(WorkerEngine::new(
            &config.engine.url,
            &config.model.name,
            config.engine.timeout(),
        )?),
    };
    Ok(engine)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
