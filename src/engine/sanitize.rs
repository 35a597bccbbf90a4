//! Output sanitizer
//!
//! Turns raw container output into text safe to hand back: terminal escape
//! sequences and control characters removed, length bounded.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum characters of output returned for one run
pub const MAX_OUTPUT_CHARS: usize = 500_000;

/// CSI sequences (colors, cursor moves), OSC strings, charset selection and
/// two-byte ESC forms
const ESCAPE_SEQUENCE_PATTERN: &str = concat!(
    r"\x1b\[[0-?]*[ -/]*[@-~]",
    r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
    r"|\x1b[()*+][0-9A-Za-z]",
    r"|\x1b[@-Z\\-_]",
);

fn escape_sequence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ESCAPE_SEQUENCE_PATTERN).expect("escape sequence pattern"))
}

/// Strip escape sequences and control characters, then keep the first
/// `max_chars` characters. Idempotent.
pub fn sanitize(raw: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    let stripped = escape_sequence().replace_all(&text, "");

    stripped
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .take(max_chars)
        .collect()
}
