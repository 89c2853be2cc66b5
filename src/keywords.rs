//! Per-dataset keyword and ignoreword sets.
//!
//! Adapted from `shankeleven-khoj/src/ignore_rules.rs`'s "load a rule file once, match against
//! it forever" shape, but owned per [`crate::Engine`] instead of stashed in a process-global
//! `OnceLock` — a process may legitimately open more than one data directory, and each has its
//! own `keywords.txt`/`ignorewords.txt`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// A keyword is exempted from stop-word filtering and from the length/digit-count skip rules;
/// an ignoreword is unconditionally replaced by `*` regardless of its shape.
#[derive(Debug, Default, Clone)]
pub struct WordLists {
    keywords: HashSet<String>,
    ignorewords: HashSet<String>,
}

impl WordLists {
    pub fn new(keywords: HashSet<String>, ignorewords: HashSet<String>) -> Self {
        WordLists { keywords, ignorewords }
    }

    /// Loads `keywords.txt` and `ignorewords.txt` from a data directory, per §6's layout. Missing
    /// files are treated as empty lists, not an error.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        Ok(WordLists {
            keywords: load_word_file(&data_dir.join("keywords.txt"))?,
            ignorewords: load_word_file(&data_dir.join("ignorewords.txt"))?,
        })
    }

    /// Merges additional keywords/ignorewords (e.g. from a Configuration record) into the sets
    /// loaded from disk.
    pub fn extend(&mut self, keywords: impl IntoIterator<Item = String>, ignorewords: impl IntoIterator<Item = String>) {
        self.keywords.extend(keywords);
        self.ignorewords.extend(ignorewords);
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(word)
    }

    pub fn is_ignoreword(&self, word: &str) -> bool {
        self.ignorewords.contains(word)
    }
}

fn load_word_file(path: &Path) -> Result<HashSet<String>> {
    if !path.is_file() {
        return Ok(HashSet::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_lowercase)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_files_yield_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let lists = WordLists::load_from_dir(dir.path()).unwrap();
        assert!(!lists.is_keyword("anything"));
        assert!(!lists.is_ignoreword("anything"));
    }

    #[test]
    fn loads_and_lowercases_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("keywords.txt")).unwrap();
        writeln!(f, "ERROR\ncrit\n").unwrap();
        let lists = WordLists::load_from_dir(dir.path()).unwrap();
        assert!(lists.is_keyword("error"));
        assert!(lists.is_keyword("crit"));
        assert!(!lists.is_keyword("warn"));
    }
}
