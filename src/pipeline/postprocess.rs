//! Post-processing: turn a model's feedback reply into a JSON object.
//!
//! Even when told to return bare JSON, models sometimes wrap the object in
//! ```` ```json ```` fences, prepend a BOM or a sentence of chatter. These
//! rules strip that packaging without touching the object itself.
//!
//! Rules run in order: normalise line endings, drop invisible characters,
//! strip outer fences, then cut to the outermost `{ … }` span.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Why a reply could not be turned into feedback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply is not valid JSON: {0}")]
    Json(String),

    #[error("reply is JSON but not an object")]
    NotAnObject,
}

/// Clean and parse a feedback reply.
pub fn parse_feedback(raw: &str) -> Result<Map<String, Value>, FeedbackParseError> {
    let cleaned = clean_feedback_text(raw);
    if cleaned.is_empty() {
        return Err(FeedbackParseError::Empty);
    }
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FeedbackParseError::NotAnObject),
        Err(e) => Err(FeedbackParseError::Json(e.to_string())),
    }
}

/// Apply every cleanup rule to the raw reply.
pub fn clean_feedback_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = strip_code_fences(&s);
    extract_object_span(&s).trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 4: Cut to the outermost object ──────────────────────────────────────
//
// Leading "Here is the analysis:" or trailing remarks are dropped. A reply
// with no braces is returned unchanged so the JSON error names the real text.

fn extract_object_span(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}
