//! Truncation helpers for plan text and long query previews.

use crate::limits::SEPARATOR_ELLIPSIS;

/// UTF-8 safe byte slicing, adjusted to the nearest valid char boundaries.
fn safe_utf8_slice(text: &str, start: usize, limit: usize) -> (String, usize, usize) {
    let len = text.len();

    if start >= len {
        return (String::new(), len, len);
    }

    let mut actual_start = start.min(len);
    while actual_start < len && !text.is_char_boundary(actual_start) {
        actual_start += 1;
    }

    let mut actual_end = (actual_start + limit).min(len);
    while actual_end > actual_start && !text.is_char_boundary(actual_end) {
        actual_end -= 1;
    }

    (text[actual_start..actual_end].to_string(), actual_start, actual_end)
}

/// Cut `text` to at most `max_len` chars, inserting the skip separator in the
/// middle. Returns `(preview, was_truncated)`.
pub fn cut_text(text: &str, max_len: usize) -> (String, bool) {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return (text.to_string(), false);
    }

    let half = max_len / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();

    (format!("{head}{SEPARATOR_ELLIPSIS}{tail}"), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_text_leaves_short_text_alone() {
        let (preview, truncated) = cut_text("select 1", 400);
        assert_eq!(preview, "select 1");
        assert!(!truncated);
    }

    #[test]
    fn cut_text_truncates_long_text() {
        let long = "a".repeat(1000);
        let (preview, truncated) = cut_text(&long, 400);
        assert!(truncated);
        assert!(preview.contains("[...SKIP...]"));
        assert!(preview.len() < long.len());
    }

    #[test]
    fn safe_utf8_slice_avoids_splitting_multibyte_chars() {
        let text = "héllo wörld";
        let (slice, start, _end) = safe_utf8_slice(text, 2, 10);
        assert!(text.is_char_boundary(start));
        assert!(!slice.is_empty());
    }
}
