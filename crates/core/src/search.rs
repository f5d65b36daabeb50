//! Tokenization for the search index.
//!
//! Words are runs of letters, digits, apostrophes and hyphens. Everything
//! else separates words. Counting folds case so `Rust` and `rust` share an
//! index entry.

use std::collections::BTreeMap;

/// Longest word stored in the index; longer runs are truncated.
pub const MAX_WORD_CHARS: usize = 64;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\'' || c == '-'
}

/// Split text into raw word tokens, preserving case and order.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lower-cased word frequencies, ordered by word.
pub fn word_counts(text: &str) -> BTreeMap<String, i32> {
    let mut counts = BTreeMap::new();
    for word in tokenize(text) {
        let word: String = word.to_lowercase().chars().take(MAX_WORD_CHARS).collect();
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_punctuation_and_space() {
        assert_eq!(
            tokenize("Hello, world! It's a well-known fact."),
            vec!["Hello", "world", "It's", "a", "well-known", "fact"]
        );
    }

    #[test]
    fn tokenize_handles_empty_and_separator_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ... !!").is_empty());
    }

    #[test]
    fn word_counts_fold_case() {
        let counts = word_counts("Rust rust RUST go");
        assert_eq!(counts.get("rust"), Some(&3));
        assert_eq!(counts.get("go"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn word_counts_truncate_very_long_words() {
        let long = "a".repeat(MAX_WORD_CHARS + 10);
        let counts = word_counts(&long);
        let (word, _) = counts.iter().next().unwrap();
        assert_eq!(word.chars().count(), MAX_WORD_CHARS);
    }
}
