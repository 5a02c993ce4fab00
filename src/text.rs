// src/text.rs
//! Small string helpers shared by ingestion and the generation stages.

/// Keep at most `max` chars (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Collapse any run of whitespace (including newlines) to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Single line, collapsed whitespace, capped at `max_chars`.
/// Unlike an ASCII sanitizer this keeps non-Latin scripts intact.
pub fn sanitize_line(input: &str, max_chars: usize) -> String {
    let line = collapse_whitespace(input);
    truncate_chars(&line, max_chars).trim_end().to_string()
}

/// True when the text is mostly Latin letters and therefore needs translation.
///
/// Counts alphabetic chars only; the ASCII share must be strictly above one half.
/// Text without any letters never needs translation.
pub fn needs_translation(text: &str) -> bool {
    let mut total = 0usize;
    let mut ascii = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        total += 1;
        if c.is_ascii_alphabetic() {
            ascii += 1;
        }
    }
    // ascii / total > 0.5 without floats
    total > 0 && ascii * 2 > total
}

/// True for empty text or text made only of punctuation, symbols and whitespace.
pub fn is_only_punctuation(s: &str) -> bool {
    !s.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("数据库", 2), "数据");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn sanitize_line_flattens_and_caps() {
        assert_eq!(sanitize_line("  a\n\tb   c ", 100), "a b c");
        assert_eq!(sanitize_line("abc def", 4), "abc");
    }

    #[test]
    fn translation_threshold_is_strict() {
        // 2 ascii of 4 letters: exactly one half
        assert!(!needs_translation("ab数据"));
        // 3 of 5
        assert!(needs_translation("abc数据"));
        assert!(needs_translation("Hello world"));
        assert!(!needs_translation("大语言模型"));
        assert!(!needs_translation("1234 !!"));
        assert!(!needs_translation(""));
    }

    #[test]
    fn punctuation_only() {
        assert!(is_only_punctuation("..."));
        assert!(is_only_punctuation("  -- !! "));
        assert!(is_only_punctuation(""));
        assert!(!is_only_punctuation("a."));
    }
}
