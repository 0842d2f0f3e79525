//! Text utilities that need no staging.

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of Unicode scalar values, whitespace included.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("  two\twords\n"), 2);
    }

    #[test]
    fn test_char_count_counts_scalars_not_bytes() {
        assert_eq!(char_count(""), 0);
        assert_eq!(char_count("a b"), 3);
        assert_eq!(char_count("héllo"), 5);
        assert_eq!(char_count("日本"), 2);
    }
}
