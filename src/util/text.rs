//! Text helpers shared by tools and the command engine.

/// Truncate to at most `max_bytes` without splitting a UTF-8 code point.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    &s[..cutoff]
}

/// Split `s` into chunks of at most `max_bytes`, on code point boundaries.
pub fn chunk_utf8(s: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(4);
    let mut chunks = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let head = truncate_utf8(rest, max_bytes);
        chunks.push(head.to_string());
        rest = &rest[head.len()..];
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_utf8_never_splits_codepoints() {
        let s = "ab😀cd";
        assert_eq!(truncate_utf8(s, 0), "");
        assert_eq!(truncate_utf8(s, 2), "ab");
        assert_eq!(truncate_utf8(s, 3), "ab");
        assert_eq!(truncate_utf8(s, 5), "ab");
        assert_eq!(truncate_utf8(s, 6), "ab😀");
    }

    #[test]
    fn chunk_utf8_covers_input_exactly() {
        let s = "héllo wörld, ünïcode";
        let chunks = chunk_utf8(s, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), s);
    }

    #[test]
    fn chunk_utf8_of_empty_string_is_empty() {
        assert!(chunk_utf8("", 10).is_empty());
    }
}
