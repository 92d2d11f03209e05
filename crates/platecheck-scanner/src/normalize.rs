//! Text cleanup for labels and free-text blocks on the result page.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a field label into a lowercase, accent-free lookup key.
///
/// Whitespace runs (including non-breaking spaces) collapse to one space and
/// a trailing colon is dropped.
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let trimmed = collapsed.strip_suffix(':').unwrap_or(&collapsed).trim();
    remove_diacritics(trimmed).to_lowercase()
}

/// Clean a multi-line text block.
///
/// Line endings become `\n`, whitespace inside each line collapses to a
/// single space, and blank lines are removed.
#[must_use]
pub fn normalize_multiline(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip combining marks after canonical decomposition.
///
/// `đ`/`Đ` carry no decomposable mark and are mapped to `d`/`D` first.
#[must_use]
pub fn remove_diacritics(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    // Unicode White_Space, so this also splits on U+00A0.
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
