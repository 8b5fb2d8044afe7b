//! Grounding markup
//!
//! The model marks located text as
//! `<|ref|>label<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>`.
//! Both scans below are total: a block whose coordinates don't parse is
//! skipped by extraction but still stripped by cleaning.
//!
//! Matching contract:
//! - a block may span lines (labels and coordinate lists can hold newlines)
//! - whitespace is allowed between the reference and detection tags
//! - blocks are found anywhere in the text, left to right, without overlap
//! - each block succeeds or fails on its own

use std::sync::LazyLock;

use regex::Regex;

use super::prompt::GROUNDING_TOKEN;
use super::types::Detection;

pub const REF_OPEN: &str = "<|ref|>";
pub const DET_OPEN: &str = "<|det|>";

static DET_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<\|ref\|>(?P<label>.*?)<\|/ref\|>\s*<\|det\|>\s*\[\s*\[\s*(?P<coords>[^\]]+?)\s*\]\s*\]\s*<\|/det\|>",
    )
    .unwrap()
});

/// Whether `text` may hold detections worth extracting
pub fn has_detection_markup(text: &str) -> bool {
    text.contains(DET_OPEN) || text.contains(REF_OPEN)
}

/// Whether `text` holds any markup that cleaning would strip
pub fn has_display_markup(text: &str) -> bool {
    has_detection_markup(text) || text.contains(GROUNDING_TOKEN)
}

/// Extract labelled boxes, in order of appearance
pub fn extract_detections(text: &str) -> Vec<Detection> {
    DET_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let label = caps.name("label")?.as_str().trim();
            let coords = caps.name("coords")?.as_str();
            match parse_box(coords) {
                Some(bbox) => Some(Detection {
                    label: label.to_string(),
                    bbox,
                }),
                None => {
                    tracing::debug!(label, coords, "Skipping detection with unusable coordinates");
                    None
                }
            }
        })
        .collect()
}

/// Replace each block with its label, drop grounding tokens, trim
///
/// Substitution repeats until nothing changes, so the result never contains
/// markup that a second pass would strip.
pub fn clean_display_text(text: &str) -> String {
    let mut cleaned = text.to_string();
    loop {
        let next = DET_BLOCK
            .replace_all(&cleaned, "${label}")
            .replace(GROUNDING_TOKEN, "");
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.trim().to_string()
}

/// Exactly four comma-separated numbers
fn parse_box(coords: &str) -> Option<[f64; 4]> {
    let values = coords
        .split(',')
        .map(|token| token.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if !values.iter().all(|v| v.is_finite()) {
        return None;
    }
    values.try_into().ok()
}
