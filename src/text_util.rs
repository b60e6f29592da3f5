/// Default number of lines in a snippet when no match is found.
pub const DEFAULT_SNIPPET_LINES: usize = 6;

/// Maximum number of characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 400;

/// Prepend line numbers to each line of text.
///
/// `start_line` is the number to assign to the first line (1-indexed).
pub fn add_line_numbers(text: &str, start_line: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", start_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to at most `max_chars` characters, appending `...` when
/// anything was removed. Never splits a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Extract a snippet around the first line containing any query word.
///
/// Returns `(snippet_text, start_line_number)` where start_line_number is
/// 1-indexed. Without a match, returns the first few lines.
/// Returns `None` if the text is empty.
pub fn extract_snippet(text: &str, query: &str) -> Option<(String, usize)> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let words: Vec<String> = query
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();

    let match_idx = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        words.iter().any(|w| lower.contains(w.as_str()))
    });

    let (start, end) = match match_idx {
        Some(idx) => (idx.saturating_sub(2), (idx + 3).min(lines.len())),
        None => (0, DEFAULT_SNIPPET_LINES.min(lines.len())),
    };

    let snippet = lines[start..end].join("\n");
    Some((truncate_chars(&snippet, DEFAULT_SNIPPET_MAX_CHARS), start + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbers_start_at_offset() {
        assert_eq!(add_line_numbers("a\nb", 4), "4: a\n5: b");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll...");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[test]
    fn snippet_centers_on_match() {
        let text = "one\ntwo\nthree\nfour deploy\nfive\nsix\nseven";
        let (snippet, start) = extract_snippet(text, "how to deploy").unwrap();
        assert_eq!(start, 2);
        assert_eq!(snippet, "two\nthree\nfour deploy\nfive\nsix");
    }

    #[test]
    fn snippet_without_match_uses_head() {
        let text = "1\n2\n3\n4\n5\n6\n7\n8";
        let (snippet, start) = extract_snippet(text, "missing").unwrap();
        assert_eq!(start, 1);
        assert_eq!(snippet.lines().count(), DEFAULT_SNIPPET_LINES);
    }

    #[test]
    fn snippet_of_empty_text() {
        assert!(extract_snippet("", "query").is_none());
    }

    #[test]
    fn long_snippet_is_truncated() {
        let text = "ü".repeat(1000);
        let (snippet, _) = extract_snippet(&text, "x").unwrap();
        assert_eq!(snippet.chars().count(), DEFAULT_SNIPPET_MAX_CHARS + 3);
    }
}
