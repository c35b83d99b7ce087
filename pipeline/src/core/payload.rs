//! Structured payload recovery from free-form generator output.
//!
//! Recovery is a fallback chain that stops at the first success:
//!
//! 1. fenced blocks, most recent first;
//! 2. balanced `{}`/`[]` spans of the fence-stripped text (see
//!    [`candidate_spans`] for ordering);
//! 3. the whole trimmed text.
//!
//! Only objects and arrays count as payloads. When nothing parses the result is
//! a [`ParseFailure`] carrying the last error and a tail excerpt of the input.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::fence::{fenced_blocks, strip_fence_markers};
use crate::core::scanner::candidate_spans;

/// Maximum number of characters kept in a failure excerpt.
pub const EXCERPT_CHARS: usize = 400;

/// Outcome of payload recovery. Never an error: failures are a variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedPayload {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Failure(ParseFailure),
}

/// Why recovery failed, plus a diagnostic excerpt of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub reason: String,
    pub excerpt: String,
}

impl ExtractedPayload {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The recovered value, or `None` for a failure.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Object(map) => Some(Value::Object(map.clone())),
            Self::Array(items) => Some(Value::Array(items.clone())),
            Self::Failure(_) => None,
        }
    }
}

/// Recover the intended structured payload from `raw`.
pub fn parse_payload(raw: &str) -> ExtractedPayload {
    let text = raw.trim();
    if text.is_empty() {
        return ExtractedPayload::Failure(ParseFailure {
            reason: "empty task output".to_string(),
            excerpt: String::new(),
        });
    }

    for block in fenced_blocks(text).into_iter().rev() {
        if let Ok(payload) = parse_strict(block) {
            return payload;
        }
    }

    let stripped = strip_fence_markers(text);
    for span in candidate_spans(&stripped) {
        if let Ok(payload) = parse_strict(span.text) {
            return payload;
        }
    }

    let whole = stripped.trim();
    match parse_strict(whole) {
        Ok(payload) => payload,
        Err(reason) => ExtractedPayload::Failure(ParseFailure {
            reason: format!("failed to parse JSON: {reason}"),
            excerpt: tail_chars(whole, EXCERPT_CHARS).to_string(),
        }),
    }
}

/// Strictly parse `text` as a JSON object or array.
pub fn parse_strict(text: &str) -> Result<ExtractedPayload, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(ExtractedPayload::Object(map)),
        Ok(Value::Array(items)) => Ok(ExtractedPayload::Array(items)),
        Ok(other) => Err(format!(
            "expected a JSON object or array, found {}",
            json_kind(&other)
        )),
        Err(err) => Err(err.to_string()),
    }
}

/// Strictly parse `text` as a JSON object.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// The last `max` characters of `text`.
pub fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    let offset = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    &text[offset..]
}

/// The first `max` characters of `text`.
pub fn head_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
