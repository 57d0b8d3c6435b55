/// Truncate `s` to at most `max_bytes` bytes without splitting a code point.
///
/// Returns the input unchanged when it already fits.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_unchanged() {
        assert_eq!(truncate_utf8("alice", 64), "alice");
        assert_eq!(truncate_utf8("", 0), "");
    }

    #[test]
    fn ascii_cut_exact() {
        assert_eq!(truncate_utf8("abcdef", 3), "abc");
    }

    #[test]
    fn never_splits_multibyte() {
        // 23 three-byte characters plus one ASCII byte = 70 bytes
        let name = format!("{}x", "語".repeat(23));
        assert_eq!(name.len(), 70);
        let out = truncate_utf8(&name, 64);
        assert!(out.len() <= 64);
        assert_eq!(out.len(), 63);
        assert!(out.chars().all(|c| c == '語'));
        assert!(!out.contains('\u{FFFD}'));
    }

    #[test]
    fn four_byte_sequences() {
        let s = "🦀🦀";
        assert_eq!(truncate_utf8(s, 7), "🦀");
        assert_eq!(truncate_utf8(s, 3), "");
    }
}
