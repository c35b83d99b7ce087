//! Triple-backtick fenced block extraction.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").expect("fence regex"));

static FENCE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("fence marker regex"));

/// Inner contents of every fenced block in document order.
///
/// Surrounding whitespace is trimmed and empty blocks are skipped. Callers
/// that want the most recent block iterate the result in reverse.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim())
        .filter(|inner| !inner.is_empty())
        .collect()
}

/// The last fenced block, if any.
pub fn last_fenced_block(text: &str) -> Option<&str> {
    fenced_blocks(text).pop()
}

/// Replace every fence marker with a line break, leaving block bodies in place.
pub fn strip_fence_markers(text: &str) -> Cow<'_, str> {
    FENCE_MARKER_RE.replace_all(text, "\n")
}
