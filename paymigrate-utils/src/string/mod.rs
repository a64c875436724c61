//! String helpers

use unicode_segmentation::UnicodeSegmentation;

/// Truncate text to at most `max_len` bytes on a grapheme boundary,
/// appending "..." when anything was cut.
pub fn safe_truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let budget = max_len.saturating_sub(3);
    let mut truncated = String::new();
    for grapheme in text.graphemes(true) {
        if truncated.len() + grapheme.len() > budget {
            break;
        }
        truncated.push_str(grapheme);
    }

    if max_len >= 3 {
        truncated.push_str("...");
    }
    truncated
}

/// 1-based line number of a byte offset
pub fn line_of_offset(text: &str, byte_pos: usize) -> usize {
    let end = byte_pos.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Byte range of the whole lines covering `start..end`, newline excluded
pub fn expand_to_lines(text: &str, start: usize, end: usize) -> (usize, usize) {
    let start = start.min(text.len());
    let end = end.clamp(start, text.len());
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
    (line_start, line_end)
}

/// Convert camelCase or PascalCase to snake_case
pub fn camel_to_snake(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            result.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    result
}
