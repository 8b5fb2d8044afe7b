//! OCR Types
//!
//! Request options, detections and results for a single OCR request.

use serde::{Deserialize, Serialize};

/// OCR task selector, controlling the instruction sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Raw text only
    PlainOcr,
    /// Whole document as markdown
    Markdown,
    /// Tables as CSV, separated by `---`
    TablesCsv,
    /// Tables as GitHub-flavored markdown
    TablesMd,
    /// Key/value extraction into a caller-supplied JSON schema
    KvJson,
    /// Numeric series plus a short summary
    FigureChart,
    /// Locate a term in the image
    FindRef,
    /// JSON array of layout blocks
    LayoutMap,
    /// JSON array of personal data occurrences
    PiiRedact,
    /// OCR in the document's own script
    Multilingual,
    /// Short description of the image
    Describe,
    /// Caller-supplied instruction
    Freeform,
}

impl Mode {
    pub const ALL: [Mode; 12] = [
        Mode::PlainOcr,
        Mode::Markdown,
        Mode::TablesCsv,
        Mode::TablesMd,
        Mode::KvJson,
        Mode::FigureChart,
        Mode::FindRef,
        Mode::LayoutMap,
        Mode::PiiRedact,
        Mode::Multilingual,
        Mode::Describe,
        Mode::Freeform,
    ];

    /// Parse a wire tag. Exact match only; unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.tag() == tag)
    }

    /// Wire tag for this mode
    pub fn tag(self) -> &'static str {
        match self {
            Mode::PlainOcr => "plain_ocr",
            Mode::Markdown => "markdown",
            Mode::TablesCsv => "tables_csv",
            Mode::TablesMd => "tables_md",
            Mode::KvJson => "kv_json",
            Mode::FigureChart => "figure_chart",
            Mode::FindRef => "find_ref",
            Mode::LayoutMap => "layout_map",
            Mode::PiiRedact => "pii_redact",
            Mode::Multilingual => "multilingual",
            Mode::Describe => "describe",
            Mode::Freeform => "freeform",
        }
    }

    /// Modes that always run with grounding, whatever the caller asked for
    pub fn requires_grounding(self) -> bool {
        matches!(self, Mode::FindRef | Mode::LayoutMap | Mode::PiiRedact)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::PlainOcr
    }
}

/// Whether grounding is active for a mode and the caller's flag
pub fn grounding_enabled(mode: Option<Mode>, requested: bool) -> bool {
    requested || mode.is_some_and(Mode::requires_grounding)
}

/// Options for one OCR request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Mode tag as sent by the caller
    pub mode: String,
    /// Free-text prompt (freeform mode)
    pub prompt: String,
    pub grounding: bool,
    pub include_caption: bool,
    /// Term to locate (find_ref mode)
    pub find_term: Option<String>,
    /// JSON schema text (kv_json mode), used verbatim
    pub schema: Option<String>,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    pub test_compress: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default().tag().to_string(),
            prompt: String::new(),
            grounding: false,
            include_caption: false,
            find_term: None,
            schema: None,
            base_size: 1024,
            image_size: 640,
            crop_mode: true,
            test_compress: false,
        }
    }
}

impl RequestOptions {
    /// Parsed mode, `None` for unrecognized tags
    pub fn parsed_mode(&self) -> Option<Mode> {
        Mode::from_tag(&self.mode)
    }

    /// Grounding flag after applying the grounding-mandatory modes
    pub fn grounding_enabled(&self) -> bool {
        grounding_enabled(self.parsed_mode(), self.grounding)
    }
}

/// One labelled bounding box parsed from grounding markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// `[x1, y1, x2, y2]`
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
}

/// Original image size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub w: u32,
    pub h: u32,
}

/// Request options echoed back with the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrMetadata {
    pub mode: String,
    /// Resolved grounding flag
    pub grounding: bool,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
}

impl From<&RequestOptions> for OcrMetadata {
    fn from(options: &RequestOptions) -> Self {
        Self {
            mode: options.mode.clone(),
            grounding: options.grounding_enabled(),
            base_size: options.base_size,
            image_size: options.image_size,
            crop_mode: options.crop_mode,
        }
    }
}

/// OCR result
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    /// Text with grounding markup stripped; never empty
    pub display_text: String,
    /// Detections in the order they appear in the model output
    pub detections: Vec<Detection>,
    /// `None` when the upload could not be decoded as an image
    pub image_dims: Option<ImageDims>,
    pub metadata: OcrMetadata,
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Model not loaded yet")]
    ServiceUnavailable,

    /// Failure while writing scratch files or running inference
    #[error("{kind}: {message}")]
    Inference { kind: &'static str, message: String },
}

impl OcrError {
    pub fn inference(kind: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Inference {
            kind,
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for OcrError {
    fn from(err: std::io::Error) -> Self {
        Self::inference("Io", err)
    }
}
