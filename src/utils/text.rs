//! Text processing utilities.

use regex::Regex;
use std::sync::LazyLock;

static RE_HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid regex"));
static RE_TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m) +$").expect("valid regex"));
static RE_MULTI_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Clean up text extracted from a PDF page.
///
/// Line endings become `\n`, horizontal whitespace runs collapse to one space,
/// blank-line runs collapse to one blank line, and the ends are trimmed.
pub fn normalize_page_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = RE_HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = RE_TRAILING_SPACE.replace_all(&text, "");
    let text = RE_MULTI_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Length in characters, the unit chunk sizes are measured in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
