//! C8 — Subject Register: the masked original line kept as evidence for each phrase ID.
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/items.go`'s `lastValue` column
//! (the "last raw line seen for this ID" idea) generalized into a dedicated per-phrase store, plus
//! `rare_phrases.go`'s reporting use of that value as the line shown to the user.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dictionary::{Dictionary, TermId};

static RUN_OF_ASTERISKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(?:\s+\*)+").unwrap());

/// Keeps the first original line that resolved to a given phrase, with the generalized terms
/// masked out.
#[derive(Debug, Default)]
pub struct SubjectRegister {
    subjects: HashMap<TermId, String>,
}

impl SubjectRegister {
    pub fn new() -> Self {
        SubjectRegister::default()
    }

    /// Records `original_line` for `phrase_id` the first time it is seen; later calls for the
    /// same ID are no-ops, per §4.8 ("the line that *first* matches it").
    pub fn record(&mut self, phrase_id: TermId, original_line: &str, excludes: &HashSet<TermId>, term_dict: &Dictionary) {
        self.subjects.entry(phrase_id).or_insert_with(|| mask_line(original_line, excludes, term_dict));
    }

    pub fn get(&self, phrase_id: TermId) -> Option<&str> {
        self.subjects.get(&phrase_id).map(String::as_str)
    }

    pub fn remove(&mut self, phrase_id: TermId) {
        self.subjects.remove(&phrase_id);
    }
}

/// Replaces every case-insensitive, delimiter-bounded occurrence of an excluded term's surface
/// form with `*`, then collapses any resulting run of `"* *"` into a single `*`.
fn mask_line(line: &str, excludes: &HashSet<TermId>, term_dict: &Dictionary) -> String {
    let mut surfaces: Vec<String> = excludes
        .iter()
        .filter(|&&id| id >= 0)
        .map(|&id| term_dict.get_member(id))
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s))
        .collect();
    if surfaces.is_empty() {
        return line.to_string();
    }
    // Longest-first so a shorter excluded term can't shadow a longer one that contains it.
    surfaces.sort_by(|a, b| b.len().cmp(&a.len()));
    surfaces.dedup();

    let pattern = format!(r"(?i)\b(?:{})\b", surfaces.join("|"));
    let masked = match Regex::new(&pattern) {
        Ok(re) => re.replace_all(line, "*").into_owned(),
        Err(_) => line.to_string(),
    };
    RUN_OF_ASTERISKS.replace_all(&masked, "*").into_owned()
}
