//! DeepSeek OCR Server Library
//!
//! HTTP front end for an OCR vision-language model. Builds mode-specific
//! instructions, runs them through an inference engine and returns cleaned
//! text plus any grounding boxes.
//!
//! The server binary is in main.rs; the modules are exposed here for
//! integration tests.
//!
//! # Modules
//!
//! - `ocr`: Instruction building, grounding parsing, engine backends, request orchestration
//! - `routes`: HTTP endpoints
//! - `state`: Shared state and the engine lifecycle

pub mod config;
pub mod error;
pub mod ocr;
pub mod routes;
pub mod state;
