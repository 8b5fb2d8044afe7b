//! Health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub model: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.engine().is_loaded().await,
    })
}

pub async fn root(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        message: "DeepSeek-OCR API is running!",
        version: env!("CARGO_PKG_VERSION"),
        model: state.config().model.name.clone(),
    })
}
