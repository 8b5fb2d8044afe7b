//! OCR Module
//!
//! Request orchestration for the OCR model: instruction building, grounding
//! markup parsing and the inference engine boundary.
//!
//! Supports multiple engine backends:
//! - Ollama (local model server)
//! - Model worker sidecar (HTTP, shared filesystem)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deepseek_ocr_server::ocr::{EngineSlot, OcrService, RequestOptions};
//!
//! let slot = EngineSlot::new();
//! slot.install(engine).await;
//!
//! let service = OcrService::new(slot);
//! let result = service.handle(&image_bytes, &RequestOptions::default()).await?;
//! println!("{}", result.display_text);
//! ```

pub mod engine;
pub mod grounding;
pub mod ollama;
pub mod prompt;
mod service;
mod types;
pub mod worker;

pub use engine::{EngineError, EngineSlot, InferenceEngine, InferenceRequest, RawModelOutput};
pub use ollama::OllamaEngine;
pub use prompt::Instruction;
pub use service::{OcrService, NO_TEXT_PLACEHOLDER, RESULT_ARTIFACT};
pub use types::{
    grounding_enabled, Detection, ImageDims, Mode, OcrError, OcrMetadata, OcrResult,
    RequestOptions,
};
pub use worker::WorkerEngine;
