//! Post-processing: tidy provider text before it is stored.
//!
//! Vision models answer in loosely formatted Markdown. Some wrap the whole
//! reply in a ```` ```markdown ```` fence, some emit CRLF or zero-width
//! characters copied from the page. These passes are purely cosmetic and
//! never change wording. Placeholders bypass this module entirely so they
//! stay byte-for-byte deterministic.
//!
//! Order matters: fences are stripped before line endings are normalised so
//! the fence regex sees the reply exactly as it arrived.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page explanation.
///
/// 1. Strip an outer markdown fence
/// 2. CRLF / CR → LF
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of blank lines to one
/// 5. Drop invisible Unicode (ZWSP, BOM, soft hyphen, joiners)
/// 6. Trim the whole text
pub fn clean_explanation(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Fences ───────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*?)\r?\n```$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
