//! OCR Routes
//!
//! Endpoints:
//! - POST /api/ocr - Run the model on an uploaded image

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::ocr::{Detection, ImageDims, OcrMetadata, OcrResult, RequestOptions};
use crate::state::AppState;

/// Create the OCR router
pub fn router() -> Router<AppState> {
    Router::new().route("/ocr", post(ocr_inference))
}

/// Successful OCR response
#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub success: bool,
    pub text: String,
    pub boxes: Vec<Detection>,
    pub image_dims: Option<ImageDims>,
    pub metadata: OcrMetadata,
}

impl From<OcrResult> for OcrResponse {
    fn from(result: OcrResult) -> Self {
        Self {
            success: true,
            text: result.display_text,
            boxes: result.detections,
            image_dims: result.image_dims,
            metadata: result.metadata,
        }
    }
}

/// Parsed multipart form
#[derive(Debug)]
struct OcrUpload {
    image: Bytes,
    options: RequestOptions,
}

/// POST /api/ocr
///
/// Multipart fields: `image` (required), `mode`, `prompt`, `grounding`,
/// `include_caption`, `find_term`, `schema`, `base_size`, `image_size`,
/// `crop_mode`, `test_compress`.
async fn ocr_inference(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>> {
    let upload = read_upload(multipart?).await?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("ocr", %request_id, mode = %upload.options.mode);

    async move {
        tracing::info!(bytes = upload.image.len(), "Received OCR request");
        let result = state.ocr().handle(&upload.image, &upload.options).await?;
        Ok::<_, AppError>(Json(OcrResponse::from(result)))
    }
    .instrument(span)
    .await
}

async fn read_upload(mut multipart: Multipart) -> Result<OcrUpload> {
    let mut image = None;
    let mut options = RequestOptions::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        if name == "image" {
            tracing::debug!(
                filename = ?field.file_name(),
                content_type = ?field.content_type(),
                "Received image field"
            );
            image = Some(field.bytes().await?);
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "mode" => options.mode = value,
            "prompt" => options.prompt = value,
            "grounding" => options.grounding = parse_bool(&name, &value)?,
            "include_caption" => options.include_caption = parse_bool(&name, &value)?,
            "find_term" => options.find_term = Some(value),
            "schema" => options.schema = Some(value),
            "base_size" => options.base_size = parse_int(&name, &value)?,
            "image_size" => options.image_size = parse_int(&name, &value)?,
            "crop_mode" => options.crop_mode = parse_bool(&name, &value)?,
            "test_compress" => options.test_compress = parse_bool(&name, &value)?,
            _ => tracing::debug!("Ignoring unknown field '{}'", name),
        }
    }

    let image = image.ok_or_else(|| AppError::Validation("Missing required field: image".to_string()))?;
    Ok(OcrUpload { image, options })
}

/// Form boolean, in the spellings HTML forms and JS clients send
fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "Field '{}' must be a boolean, got '{}'",
            name, value
        ))),
    }
}

fn parse_int(name: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| {
        AppError::Validation(format!(
            "Field '{}' must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}
