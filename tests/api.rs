//! HTTP API tests
//!
//! Drive the full router with a scripted inference engine.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};
use tower::ServiceExt;

use deepseek_ocr_server::config::Config;
use deepseek_ocr_server::ocr::{
    EngineError, EngineSlot, InferenceEngine, InferenceRequest, RawModelOutput,
};
use deepseek_ocr_server::routes;
use deepseek_ocr_server::state::AppState;

const BOUNDARY: &str = "ocr-test-boundary";

/// Engine that replies with a fixed output and records what it was asked
struct ScriptedEngine {
    reply: Mutex<Option<Result<RawModelOutput, EngineError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedEngine {
    fn replying(output: RawModelOutput) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(Ok(output))),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: EngineError) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(Err(err))),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.requests.lock().unwrap().last().unwrap().prompt.clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn load(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<RawModelOutput, EngineError> {
        assert!(request.image_file.is_file());
        assert!(request.output_path.is_dir());
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(RawModelOutput::default()))
    }
}

fn config(scratch: &Path) -> Config {
    let mut config = Config::default();
    config.server.scratch_dir = Some(scratch.to_path_buf());
    config
}

fn app_with(engine: Option<Arc<ScriptedEngine>>, scratch: &Path) -> (Router, AppState) {
    let slot = match engine {
        Some(engine) => EngineSlot::with_engine(engine),
        None => EngineSlot::new(),
    };
    let state = AppState::with_engine_slot(config(scratch), slot);
    (routes::router(state.clone()), state)
}

/// 3x2 PNG
fn png() -> Vec<u8> {
    let img = image::RgbImage::new(3, 2);
    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn post_ocr(app: Router, fields: &[(&str, &str)], image: Option<&[u8]>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/ocr")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(fields, image)))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn scratch_is_empty(scratch: &Path) -> bool {
    std::fs::read_dir(scratch).unwrap().next().is_none()
}

#[tokio::test]
async fn test_plain_ocr_end_to_end() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Text("Invoice #42".to_string()));
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let (status, body) = post_ocr(app, &[("mode", "plain_ocr")], Some(&png())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "text": "Invoice #42",
            "boxes": [],
            "image_dims": {"w": 3, "h": 2},
            "metadata": {
                "mode": "plain_ocr",
                "grounding": false,
                "base_size": 1024,
                "image_size": 640,
                "crop_mode": true
            }
        })
    );
    assert_eq!(engine.last_prompt(), "<image>\nFree OCR. Only output the raw text.");
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_layout_map_forces_grounding() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Record { text: json!("[]") });
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let (status, body) = post_ocr(
        app,
        &[("mode", "layout_map"), ("grounding", "false")],
        Some(&png()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "[]");
    assert_eq!(body["boxes"], json!([]));
    assert_eq!(body["metadata"]["grounding"], true);
    assert!(engine.last_prompt().starts_with("<image>\n<|grounding|>\n"));
}

#[tokio::test]
async fn test_find_ref_returns_boxes() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Text(
        "<|ref|>Invoice No<|/ref|><|det|>[[12, 40, 220, 64]]<|/det|>".to_string(),
    ));
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let (status, body) = post_ocr(
        app,
        &[
            ("mode", "find_ref"),
            ("find_term", " Invoice No "),
            ("base_size", "640"),
            ("crop_mode", "false"),
        ],
        Some(&png()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Invoice No");
    assert_eq!(
        body["boxes"],
        json!([{"label": "Invoice No", "box": [12.0, 40.0, 220.0, 64.0]}])
    );
    assert_eq!(body["metadata"]["base_size"], 640);
    assert_eq!(body["metadata"]["crop_mode"], false);
    assert!(engine.last_prompt().contains("Locate <|ref|>Invoice No<|/ref|> in the image."));

    let requests = engine.requests.lock().unwrap();
    assert_eq!(requests[0].base_size, 640);
    assert!(!requests[0].crop_mode);
}

#[tokio::test]
async fn test_engine_failure_is_500() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::failing(EngineError::OutOfMemory(
        "CUDA out of memory. Tried to allocate 2.00 GiB".to_string(),
    ));
    let (app, _) = app_with(Some(engine), scratch.path());

    let (status, body) = post_ocr(app, &[("mode", "markdown")], Some(&png())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("OutOfMemory: "), "{}", detail);
    assert!(body.get("text").is_none());
    assert!(body.get("boxes").is_none());
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_not_loaded_is_503() {
    let scratch = tempfile::tempdir().unwrap();
    let (app, _) = app_with(None, scratch.path());

    let (status, body) = post_ocr(app.clone(), &[], Some(&png())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Model not loaded yet");

    let server = TestServer::new(app).unwrap();
    let health = server.get("/health").await;
    health.assert_status_ok();
    assert_eq!(
        health.json::<Value>(),
        json!({"status": "healthy", "model_loaded": false})
    );
}

#[tokio::test]
async fn test_health_follows_engine_lifecycle() {
    let scratch = tempfile::tempdir().unwrap();
    let (app, state) = app_with(None, scratch.path());
    let server = TestServer::new(app).unwrap();

    state
        .load_engine(
            ScriptedEngine::replying(RawModelOutput::default()),
            1,
            std::time::Duration::from_millis(1),
        )
        .await
        .unwrap();
    assert_eq!(server.get("/health").await.json::<Value>()["model_loaded"], true);

    state.shutdown().await;
    assert_eq!(server.get("/health").await.json::<Value>()["model_loaded"], false);
}

#[tokio::test]
async fn test_root_info() {
    let scratch = tempfile::tempdir().unwrap();
    let (app, _) = app_with(None, scratch.path());
    let server = TestServer::new(app).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["message"], "DeepSeek-OCR API is running!");
    assert_eq!(body["model"], "deepseek-ai/DeepSeek-OCR");
}

#[tokio::test]
async fn test_validation_errors() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Text("unused".to_string()));
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let (status, body) = post_ocr(app.clone(), &[("mode", "plain_ocr")], None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "Missing required field: image");

    let (status, body) = post_ocr(app.clone(), &[("base_size", "big")], Some(&png())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("base_size"));

    let (status, body) = post_ocr(app.clone(), &[("image_size", "-1")], Some(&png())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("non-negative integer"));

    let (status, _) = post_ocr(app, &[("grounding", "sometimes")], Some(&png())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert!(engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_uses_detail_shape() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Text("unused".to_string()));
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/ocr")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"mode":"plain_ocr"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["detail"].as_str().unwrap().is_empty());
    assert!(engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_undecodable_image_still_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Fragments(vec![
        json!("line one"),
        json!("line two"),
    ]));
    let (app, _) = app_with(Some(engine), scratch.path());

    let (status, body) = post_ocr(app, &[], Some(b"definitely not an image")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "line one\nline two");
    assert_eq!(body["image_dims"], Value::Null);
}

#[tokio::test]
async fn test_unrecognized_mode_uses_generic_prompt() {
    let scratch = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::replying(RawModelOutput::Text("text".to_string()));
    let (app, _) = app_with(Some(engine.clone()), scratch.path());

    let (status, body) = post_ocr(app, &[("mode", "handwriting")], Some(&png())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["mode"], "handwriting");
    assert_eq!(body["metadata"]["grounding"], false);
    assert_eq!(engine.last_prompt(), "<image>\nOCR this image.");
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = config(scratch.path());
    config.server.max_upload_bytes = 1024;
    let engine = ScriptedEngine::replying(RawModelOutput::Text("unused".to_string()));
    let state = AppState::with_engine_slot(config, EngineSlot::with_engine(engine.clone()));
    let app = routes::router(state);

    let big = vec![0u8; 64 * 1024];
    let (status, _) = post_ocr(app, &[], Some(&big)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let scratch = tempfile::tempdir().unwrap();
    let (app, _) = app_with(None, scratch.path());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/ocr")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
