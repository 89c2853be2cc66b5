//! C4 — Phrase Tree: a prefix trie over term IDs sorted by global frequency, mining which term
//! combinations co-occur.
//!
//! No direct counterpart exists in `examples/original_source` — the retrieved Go snapshots
//! (`trans.go`'s commented-out `OLD_registerPhrase`) decide which tokens to generalize from a
//! plain IDF-gap heuristic instead of a tree. This module is built from §4.4's node/invariant
//! description directly, using the teacher's plain nested-map bookkeeping style
//! (`shankeleven-khoj/src/model.rs`'s `HashMap`-of-`HashMap` position index).

use std::collections::HashMap;

use crate::dictionary::{Dictionary, TermId};

#[derive(Debug, Default)]
struct Node {
    children: HashMap<TermId, Node>,
    count: i64,
}

/// A rooted trie whose paths are token sequences ordered by descending global term count.
#[derive(Debug, Default)]
pub struct PhraseTree {
    root: Node,
}

impl PhraseTree {
    pub fn new() -> Self {
        PhraseTree { root: Node::default() }
    }

    /// Permutes `tokens` so the highest-global-count term comes first, ties broken by ascending
    /// term ID, per §4.4.
    pub fn sorted(tokens: &[TermId], dict: &Dictionary) -> Vec<TermId> {
        let mut sorted: Vec<TermId> = tokens.to_vec();
        sorted.sort_by(|&a, &b| {
            dict.get_count(b).cmp(&dict.get_count(a)).then(a.cmp(&b))
        });
        sorted
    }

    /// Walks `sorted(tokens)` from the root, creating children as needed and adding `add` to each
    /// visited child's count. Stops at the end of the list, at the special `*` token, or once the
    /// next term's global count falls below `term_count_border`. A child whose count drops to
    /// zero or below is pruned.
    pub fn register(&mut self, tokens: &[TermId], add: i64, dict: &Dictionary, term_count_border: i64) {
        let sorted = Self::sorted(tokens, dict);
        let mut node = &mut self.root;
        node.count += add;

        for &term_id in &sorted {
            if term_id < 0 {
                break;
            }
            if dict.get_count(term_id) < term_count_border {
                break;
            }
            let child = node.children.entry(term_id).or_insert_with(Node::default);
            child.count += add;
            if child.count <= 0 {
                node.children.remove(&term_id);
                break;
            }
            node = node.children.get_mut(&term_id).expect("just inserted");
        }
    }

    /// Descends along `sorted(tokens)`, stopping at the first step where the child is absent, has
    /// count ≤ 1, or the next term's global count is below `term_count_border`. Returns
    /// `(threshold_count, split_pos)` where `split_pos` is the number of terms kept. Hard-stops at
    /// `max_len`, or at the full token length when `max_len` is 0 (the `max_match_rate = 0`
    /// default — "no extra cap"). Comparing `split_pos` against `min_len` is left to the caller
    /// (C5's step 2 uses it to pick between the generalized template and the unchanged tokens).
    pub fn search(
        &self,
        tokens: &[TermId],
        _min_len: usize,
        max_len: usize,
        dict: &Dictionary,
        term_count_border: i64,
    ) -> (i64, usize) {
        let sorted = Self::sorted(tokens, dict);
        let cap = if max_len == 0 { sorted.len() } else { max_len };
        let mut node = &self.root;
        let mut last_count = 0i64;

        for (i, &term_id) in sorted.iter().enumerate() {
            if i >= cap {
                return (last_count, i);
            }
            if term_id < 0 || dict.get_count(term_id) < term_count_border {
                return (last_count, i);
            }
            match node.children.get(&term_id) {
                Some(child) if child.count > 1 => {
                    last_count = dict.get_count(term_id);
                    node = child;
                }
                _ => return (last_count, i),
            }
        }
        (last_count, sorted.len())
    }
}
