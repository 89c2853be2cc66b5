//! C5 — Phrase Engine: turns a token sequence into a generalized template, grounded on
//! `examples/original_source/internal/rarelogdetector/trans.go`'s `registerPhrase` and the
//! tiered match-rate table in `vars.go`, redirected through [`crate::phrase_tree::PhraseTree`]
//! instead of the original's commented-out IDF-gap heuristic (`OLD_registerPhrase`).

use std::collections::HashSet;

use crate::consts::ASTERISK_TERM_ID;
use crate::dictionary::{Dictionary, TermId};
use crate::phrase_tree::PhraseTree;

pub struct PhraseResult {
    pub phrase_id: TermId,
    pub template: Vec<TermId>,
    /// Original-token IDs masked out of the template, handed to the Subject Register (C8).
    pub excludes: HashSet<TermId>,
}

pub struct PhraseEngine {
    use_custom_phrases: bool,
    custom_phrases: Vec<Vec<TermId>>,
    min_match_rate: f64,
    max_match_rate: f64,
}

impl PhraseEngine {
    pub fn new(
        use_custom_phrases: bool,
        custom_phrases: Vec<Vec<TermId>>,
        min_match_rate: f64,
        max_match_rate: f64,
    ) -> Self {
        PhraseEngine { use_custom_phrases, custom_phrases, min_match_rate, max_match_rate }
    }

    /// Step 1: a custom template matches position-wise — same length, every non-`*` slot equal.
    fn match_custom(&self, tokens: &[TermId]) -> Option<Vec<TermId>> {
        if !self.use_custom_phrases {
            return None;
        }
        self.custom_phrases
            .iter()
            .find(|tpl| {
                tpl.len() == tokens.len()
                    && tpl.iter().zip(tokens).all(|(&t, &tok)| t == ASTERISK_TERM_ID || t == tok)
            })
            .cloned()
    }

    /// Steps 1-2 of §4.5: produces a template the same length as `tokens`.
    pub fn build_template(
        &self,
        tokens: &[TermId],
        key_term_ids: &HashSet<TermId>,
        tree: &PhraseTree,
        term_dict: &Dictionary,
        term_count_border: i64,
    ) -> Vec<TermId> {
        if let Some(custom) = self.match_custom(tokens) {
            return custom;
        }

        let n = tokens.len();
        let min_len = if n > 3 { ((n as f64) * self.min_match_rate).floor() as usize } else { 3 };
        let max_len = ((n as f64) * self.max_match_rate).floor() as usize;
        let (threshold, split) = tree.search(tokens, min_len, max_len, term_dict, term_count_border);

        if split < min_len {
            return tokens.to_vec();
        }

        tokens
            .iter()
            .map(|&t| {
                if t == ASTERISK_TERM_ID {
                    ASTERISK_TERM_ID
                } else if term_dict.get_count(t) >= threshold || key_term_ids.contains(&t) {
                    t
                } else {
                    ASTERISK_TERM_ID
                }
            })
            .collect()
    }

    /// Steps 3-4: renders the template, registers it in the phrase dictionary, and reports which
    /// original tokens were masked for the Subject Register to consume.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        tokens: &[TermId],
        key_term_ids: &HashSet<TermId>,
        tree: &PhraseTree,
        term_dict: &Dictionary,
        term_count_border: i64,
        phrase_dict: &mut Dictionary,
        add_count: i64,
        last_epoch: i64,
        original_line: &str,
        is_new: bool,
    ) -> PhraseResult {
        let template = self.build_template(tokens, key_term_ids, tree, term_dict, term_count_border);
        let rendered: Vec<&str> = template.iter().map(|&t| term_dict.get_member(t)).collect();
        let phrase_id =
            phrase_dict.register(&rendered.join(" "), add_count, last_epoch, last_epoch, original_line, is_new);

        let excludes = tokens
            .iter()
            .zip(template.iter())
            .filter(|(_, &t)| t == ASTERISK_TERM_ID)
            .map(|(&orig, _)| orig)
            .filter(|&id| id >= 0)
            .collect();

        PhraseResult { phrase_id, template, excludes }
    }
}

/// Parses a custom-phrase definition ("connection * from *") into a token template, registering
/// each non-wildcard word in `term_dict` with `add_count = 0` so it resolves to a stable ID.
pub fn parse_custom_phrase(text: &str, term_dict: &mut Dictionary) -> Vec<TermId> {
    text.split_whitespace()
        .map(|word| {
            if word == "*" {
                ASTERISK_TERM_ID
            } else {
                term_dict.register(&word.to_lowercase(), 0, 0, 0, "", false)
            }
        })
        .collect()
}
