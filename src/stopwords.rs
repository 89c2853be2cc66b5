//! The built-in English stop-word set consulted by the tokenizer (§4.1 step 3).
//!
//! A word in this set is masked to `*` unless it also appears in the caller's keyword set.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// A compact, general-purpose English stop-word list. Not exhaustive by design: the tokenizer's
/// job is to suppress *filler* words, not to strip every function word a linguist would name.
const WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "for", "while", "with", "without",
    "to", "of", "in", "on", "at", "by", "from", "up", "down", "out", "over", "under", "again",
    "further", "once", "here", "there", "when", "where", "why", "how", "all", "any", "both",
    "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own",
    "same", "so", "than", "too", "very", "can", "will", "just", "should", "now", "is", "are",
    "was", "were", "be", "been", "being", "have", "has", "had", "having", "do", "does", "did",
    "doing", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "me",
    "him", "her", "us", "them", "my", "your", "his", "its", "our", "their", "as", "into", "about",
    "against", "between", "during", "before", "after", "above", "below", "off", "through",
];

pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| WORDS.iter().copied().collect());

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_filler_words_are_stopped() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("and"));
        assert!(!is_stop_word("kubernetes"));
    }
}
