use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\w+").expect("valid regex");
}

/// Split text into lower-cased word tokens: maximal runs of alphanumeric/underscore characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_RE.find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
}

/// Distinct tokens of `text`.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Number of word tokens without allocating them.
pub fn token_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Non-overlapping occurrences of `needle` in `haystack`, both expected lower-cased.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() { return 0; }
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Bluetooth-Speaker, 10W_max!");
        assert_eq!(t, vec!["bluetooth", "speaker", "10w_max"]);
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(tokenize("  ,;- ").is_empty());
        assert_eq!(token_count("a b  c"), 3);
    }

    #[test]
    fn counts_substrings() {
        assert_eq!(count_occurrences("bluetooth blue", "blue"), 2);
        assert_eq!(count_occurrences("abc", ""), 0);
    }
}
