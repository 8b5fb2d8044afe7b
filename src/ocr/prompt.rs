//! Prompt Builder
//!
//! Turns a mode and its options into the instruction sent to the model.
//! Pure and total: unknown modes and blank inputs fall back to defaults.

use super::types::{grounding_enabled, Mode};

/// Image placeholder, always the first line of an instruction
pub const IMAGE_TOKEN: &str = "<image>";

/// Activates bounding-box output
pub const GROUNDING_TOKEN: &str = "<|grounding|>";

const FALLBACK_DIRECTIVE: &str = "OCR this image.";
const CAPTION_DIRECTIVE: &str = "Then add a one-paragraph description of the image.";
const DEFAULT_FIND_TERM: &str = "Total";
const DEFAULT_SCHEMA: &str = "{}";

/// Fully assembled instruction, including structural tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction(String);

impl Instruction {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the grounding token is present
    pub fn is_grounded(&self) -> bool {
        self.0.lines().any(|line| line == GROUNDING_TOKEN)
    }
}

/// Build the instruction for a request
///
/// `mode` is `None` for unrecognized tags. `schema` is embedded verbatim and
/// never validated.
pub fn build(
    mode: Option<Mode>,
    free_text: &str,
    grounding: bool,
    find_term: Option<&str>,
    schema: Option<&str>,
    include_caption: bool,
) -> Instruction {
    let mut parts = vec![IMAGE_TOKEN.to_string()];
    if grounding_enabled(mode, grounding) {
        parts.push(GROUNDING_TOKEN.to_string());
    }

    let mut directive = match mode {
        Some(mode) => directive(mode, free_text, find_term, schema),
        None => FALLBACK_DIRECTIVE.to_string(),
    };

    if include_caption && mode != Some(Mode::Describe) {
        directive.push('\n');
        directive.push_str(CAPTION_DIRECTIVE);
    }

    parts.push(directive);
    Instruction(parts.join("\n"))
}

fn directive(mode: Mode, free_text: &str, find_term: Option<&str>, schema: Option<&str>) -> String {
    match mode {
        Mode::PlainOcr => "Free OCR. Only output the raw text.".to_string(),
        Mode::Markdown => "Convert the document to markdown.".to_string(),
        Mode::TablesCsv => "Extract every table and output CSV only. \
            Use commas, minimal quoting. If multiple tables, separate with a line containing '---'."
            .to_string(),
        Mode::TablesMd => {
            "Extract every table as GitHub-flavored Markdown tables. Output only the tables."
                .to_string()
        }
        Mode::KvJson => format!(
            "Extract key fields and return strict JSON only. Use this schema (fill the values): {}",
            non_blank(schema).unwrap_or(DEFAULT_SCHEMA)
        ),
        Mode::FigureChart => "Parse the figure. First extract any numeric series as a two-column table (x,y). \
            Then summarize the chart in 2 sentences. Output the table, then a line '---', then the summary."
            .to_string(),
        Mode::FindRef => format!(
            "Locate <|ref|>{}<|/ref|> in the image.",
            non_blank(find_term).unwrap_or(DEFAULT_FIND_TERM)
        ),
        Mode::LayoutMap => r#"Return a JSON array of blocks with fields {"type":["title","paragraph","table","figure"],"box":[x1,y1,x2,y2]}. Do not include any text content."#
            .to_string(),
        Mode::PiiRedact => "Find all occurrences of emails, phone numbers, postal addresses, and IBANs. \
            Return a JSON array of objects {label, text, box:[x1,y1,x2,y2]}."
            .to_string(),
        Mode::Multilingual => {
            "Free OCR. Detect the language automatically and output in the same script.".to_string()
        }
        Mode::Describe => {
            "Describe this image concisely in 2-3 sentences. Focus on visible key elements."
                .to_string()
        }
        Mode::Freeform => non_blank(Some(free_text))
            .unwrap_or(FALLBACK_DIRECTIVE)
            .to_string(),
    }
}

/// Trimmed text, or `None` when absent or whitespace only
fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
