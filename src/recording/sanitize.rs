//! File name sanitizing for names that come from remote participants.

const MAX_FILENAME_BYTES: usize = 255;
const FALLBACK_NAME: &str = "unknown";

fn is_invalid(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | ' ') || c.is_control()
}

/// Turn an arbitrary string into a single safe path component.
///
/// Leading/trailing spaces and dots are dropped, reserved characters, spaces
/// and control characters become `_`, and the result is capped at 255 bytes.
/// Empty results map to `"unknown"`. Applying it twice gives the same result.
pub fn safe_filename(name: &str) -> String {
    let trimmed = name.trim_matches(|c| c == ' ' || c == '.');

    let replaced: String = trimmed
        .chars()
        .map(|c| if is_invalid(c) { '_' } else { c })
        .collect();

    let mut end = replaced.len().min(MAX_FILENAME_BYTES);
    while !replaced.is_char_boundary(end) {
        end -= 1;
    }
    let safe = replaced[..end].trim_end_matches('.');

    if safe.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        safe.to_string()
    }
}
