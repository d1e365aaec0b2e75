// Text entry strategy for compiled scripts.
// pyautogui can only synthesize keys for plain ASCII; everything else goes via clipboard + Ctrl+V.

/// Returns true if the text contains CJK (Chinese/Japanese/Korean) characters.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)
        || ('\u{3040}'..='\u{309f}').contains(&c)
        || ('\u{30a0}'..='\u{30ff}').contains(&c))
}

/// Whether `text` has to be pasted instead of typed key by key.
pub fn needs_clipboard(text: &str) -> bool {
    contains_cjk(text) || !text.is_ascii()
}

/// Splits a trailing newline off typed content: models end the content with
/// `\n` to submit the input, which maps to an `enter` press.
pub fn split_submit(text: &str) -> (&str, bool) {
    match text.strip_suffix('\n') {
        Some(body) => (body.trim_end_matches('\r'), true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_typed_directly() {
        assert!(!needs_clipboard("E01257444"));
        assert!(needs_clipboard("東京"));
        assert!(needs_clipboard("café"));
    }

    #[test]
    fn trailing_newline_means_submit() {
        assert_eq!(split_submit("query\n"), ("query", true));
        assert_eq!(split_submit("query"), ("query", false));
    }
}
