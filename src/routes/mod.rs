//! Route modules for the OCR server

pub mod health;
pub mod ocr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = state.config().server.max_upload_bytes;

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            ocr::router().layer(DefaultBodyLimit::max(max_upload)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
