//! OCR Service
//!
//! Runs one OCR request end to end: instruction, scratch files, inference,
//! output normalization and grounding extraction.

use std::io;
use std::path::{Path, PathBuf};

use image::ImageReader;
use tempfile::{NamedTempFile, TempDir};

use super::engine::{EngineSlot, InferenceRequest, RawModelOutput};
use super::grounding;
use super::prompt;
use super::types::{Detection, ImageDims, OcrError, OcrMetadata, OcrResult, RequestOptions};

/// Artifact an engine may leave in its output directory
pub const RESULT_ARTIFACT: &str = "result.mmd";

/// Returned instead of an empty string
pub const NO_TEXT_PLACEHOLDER: &str = "No text returned by model.";

const SCRATCH_PREFIX: &str = "dsocr_";

/// OCR service for processing uploaded images
#[derive(Clone)]
pub struct OcrService {
    engine: EngineSlot,
    /// Parent directory for scratch files; system temp dir when `None`
    scratch_root: Option<PathBuf>,
}

impl OcrService {
    pub fn new(engine: EngineSlot) -> Self {
        Self {
            engine,
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn engine(&self) -> &EngineSlot {
        &self.engine
    }

    /// Process one uploaded image
    ///
    /// Scratch files are owned by this call and removed before it returns,
    /// on success, on error, and when the future is dropped.
    pub async fn handle(
        &self,
        image_data: &[u8],
        options: &RequestOptions,
    ) -> Result<OcrResult, OcrError> {
        let engine = self
            .engine
            .current()
            .await
            .ok_or(OcrError::ServiceUnavailable)?;

        let mode = options.parsed_mode();
        if mode.is_none() {
            tracing::debug!(mode = %options.mode, "Unrecognized mode, using generic instruction");
        }
        let instruction = prompt::build(
            mode,
            &options.prompt,
            options.grounding,
            options.find_term.as_deref(),
            options.schema.as_deref(),
            options.include_caption,
        );

        let scratch = Scratch::create(self.scratch_root.as_deref())?;
        tokio::fs::write(scratch.image_path(), image_data).await?;

        let image_dims = probe_dimensions(scratch.image_path()).await;

        let request = InferenceRequest::new(
            &instruction,
            scratch.image_path(),
            scratch.output_dir(),
            options,
        );

        tracing::debug!(engine = engine.name(), bytes = image_data.len(), "Running inference");
        let raw = engine.infer(&request).await.map_err(|e| {
            tracing::error!(kind = e.kind(), "Inference failed: {}", e);
            OcrError::from(e)
        })?;

        let text = resolve_text(&raw, scratch.output_dir()).await;
        drop(scratch);

        let (display_text, detections) = interpret(&text);

        tracing::info!(
            chars = display_text.chars().count(),
            boxes = detections.len(),
            "OCR complete"
        );

        Ok(OcrResult {
            display_text,
            detections,
            image_dims,
            metadata: OcrMetadata::from(options),
        })
    }
}

/// Scratch image file and output directory for one request
struct Scratch {
    image: NamedTempFile,
    output_dir: TempDir,
}

impl Scratch {
    fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut image_builder = tempfile::Builder::new();
        image_builder.prefix(SCRATCH_PREFIX).suffix(".png");
        let mut dir_builder = tempfile::Builder::new();
        dir_builder.prefix(SCRATCH_PREFIX);

        let (image, output_dir) = match root {
            Some(root) => (image_builder.tempfile_in(root)?, dir_builder.tempdir_in(root)?),
            None => (image_builder.tempfile()?, dir_builder.tempdir()?),
        };
        Ok(Self { image, output_dir })
    }

    fn image_path(&self) -> &Path {
        self.image.path()
    }

    fn output_dir(&self) -> &Path {
        self.output_dir.path()
    }
}

/// Image size from the file header; `None` when it isn't a decodable image
async fn probe_dimensions(path: &Path) -> Option<ImageDims> {
    let path = path.to_path_buf();
    let probe = tokio::task::spawn_blocking(move || {
        ImageReader::open(&path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(io::Error::other)
    })
    .await;

    match probe {
        Ok(Ok((w, h))) => Some(ImageDims { w, h }),
        Ok(Err(e)) => {
            tracing::debug!("Could not read image dimensions: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Dimension probe task failed: {}", e);
            None
        }
    }
}

/// Normalized engine text, falling back to the result artifact, then to a placeholder
async fn resolve_text(raw: &RawModelOutput, output_dir: &Path) -> String {
    let text = raw.normalize();
    if !text.is_empty() {
        return text;
    }

    let artifact = output_dir.join(RESULT_ARTIFACT);
    match tokio::fs::read_to_string(&artifact).await {
        Ok(contents) if !contents.trim().is_empty() => {
            tracing::debug!("Engine returned no text, using {}", RESULT_ARTIFACT);
            return contents.trim().to_string();
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to read {}: {}", artifact.display(), e),
    }

    tracing::debug!("Engine returned no text");
    NO_TEXT_PLACEHOLDER.to_string()
}

/// Split model text into display text and detections
fn interpret(text: &str) -> (String, Vec<Detection>) {
    let detections = if grounding::has_detection_markup(text) {
        grounding::extract_detections(text)
    } else {
        Vec::new()
    };

    let mut display_text = if grounding::has_display_markup(text) {
        grounding::clean_display_text(text)
    } else {
        text.to_string()
    };

    if display_text.is_empty() && !detections.is_empty() {
        display_text = detections
            .iter()
            .map(|d| d.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
    }
    if display_text.trim().is_empty() {
        display_text = NO_TEXT_PLACEHOLDER.to_string();
    }

    (display_text, detections)
}
