//! C6 — Pipeline: the three-pass orchestration (term census → phrase-tree build → phrase
//! assignment) driving a `Feed()`/`Detect()` call, plus lockstep retention rollover between the
//! term and phrase Dictionaries.
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/analyzer.go` (`Run`'s
//! three-stage loop and the `preTerms` snapshot it takes between stages) and
//! `trans.go`/`items.go` for the per-stage registration calls this replays against cached tokens
//! instead of re-tokenizing each pass.

use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, Local, TimeZone, Timelike};

use crate::block_store::Frequency;
use crate::config::Config;
use crate::dictionary::{Dictionary, TermId};
use crate::error::Result;
use crate::keywords::WordLists;
use crate::phrase_engine::{parse_custom_phrase, PhraseEngine};
use crate::phrase_tree::PhraseTree;
use crate::subject::SubjectRegister;
use crate::tokenizer::Tokenizer;

struct CachedLine {
    original_line: String,
    timestamp_epoch: i64,
    tokens: Vec<TermId>,
    key_term_ids: HashSet<TermId>,
}

pub struct DetectedLine {
    pub count: i64,
    pub original_line: String,
    pub template_string: String,
}

pub struct Pipeline {
    term_dict: Dictionary,
    phrase_dict: Dictionary,
    tree: PhraseTree,
    engine: PhraseEngine,
    subjects: SubjectRegister,
    tokenizer: Tokenizer,
    words: WordLists,
    frequency: Frequency,
    retention: i64,
    term_count_border_rate: f64,
    term_count_border: i64,
    pt_registered: bool,
    curr_retention_pos: i64,
}

impl Pipeline {
    pub fn open(config: &Config) -> Result<Self> {
        let mut words = WordLists::load_from_dir(&config.data_dir)?;
        words.extend(
            config.keywords.iter().map(|s| s.to_lowercase()),
            config.ignorewords.iter().map(|s| s.to_lowercase()),
        );
        let tokenizer = Tokenizer::new(
            (!config.log_format.is_empty()).then_some(config.log_format.as_str()),
            (!config.timestamp_layout.is_empty()).then_some(config.timestamp_layout.as_str()),
        )?;

        let mut term_dict = Dictionary::with_store(
            "terms",
            &config.data_dir,
            config.max_blocks,
            config.block_size,
            config.retention,
            config.frequency,
            config.use_gzip,
        )?;
        term_dict.load()?;

        let mut phrase_dict = Dictionary::with_store(
            "phrases",
            &config.data_dir,
            config.max_blocks,
            config.block_size,
            config.retention,
            config.frequency,
            config.use_gzip,
        )?;
        phrase_dict.load()?;

        let custom_phrases = config
            .phrases
            .iter()
            .map(|text| parse_custom_phrase(text, &mut term_dict))
            .collect();
        let engine = PhraseEngine::new(
            config.use_custom_phrases,
            custom_phrases,
            config.min_match_rate,
            config.max_match_rate,
        );

        let term_count_border = if config.term_count_border > 0 {
            config.term_count_border
        } else {
            term_dict.get_count_border(config.term_count_border_rate)
        };

        Ok(Pipeline {
            term_dict,
            phrase_dict,
            tree: PhraseTree::new(),
            engine,
            subjects: SubjectRegister::new(),
            tokenizer,
            words,
            frequency: config.frequency,
            retention: config.retention,
            term_count_border_rate: config.term_count_border_rate,
            term_count_border,
            pt_registered: false,
            curr_retention_pos: 0,
        })
    }

    pub fn term_dict(&self) -> &Dictionary {
        &self.term_dict
    }

    pub fn phrase_dict(&self) -> &Dictionary {
        &self.phrase_dict
    }

    pub fn subjects(&self) -> &SubjectRegister {
        &self.subjects
    }

    pub fn term_count_border(&self) -> i64 {
        self.term_count_border
    }

    /// Runs all three passes over `lines`, committing every registration to disk.
    pub fn feed(&mut self, lines: &[(i64, String)]) -> Result<()> {
        self.run(lines, true)?;
        Ok(())
    }

    /// Runs all three passes against in-memory state only — nothing is committed, the retention
    /// ring never rolls, and `term_count_border` is left untouched. Returns one record per line
    /// whose template matches `filter`.
    pub fn detect(&mut self, lines: &[(i64, String)], filter: impl Fn(&str) -> bool) -> Result<Vec<DetectedLine>> {
        let all = self.run(lines, false)?;
        Ok(all.into_iter().filter(|r| filter(&r.template_string)).collect())
    }

    fn run(&mut self, lines: &[(i64, String)], commit: bool) -> Result<Vec<DetectedLine>> {
        // This call's own pass 2 must run and complete before its pass 3 does; the flag is
        // per-call, not a one-time latch.
        self.pt_registered = false;

        // Pass 1: term census. `Detect()` (commit == false) registers into a disposable snapshot
        // instead of the live term Dictionary, so its tentative counts never leak into a later
        // `Feed()`'s flush — only `feed()`'s own registrations ever reach `curr_counts`/disk.
        let mut scratch_terms: Dictionary;
        let term_dict: &mut Dictionary = if commit {
            &mut self.term_dict
        } else {
            scratch_terms = self.term_dict.snapshot();
            &mut scratch_terms
        };

        let mut cached = Vec::with_capacity(lines.len());
        for (file_epoch, text) in lines {
            let out = self.tokenizer.tokenize(text, *file_epoch, term_dict, 1, true, &self.words);
            cached.push(CachedLine {
                original_line: text.clone(),
                timestamp_epoch: out.timestamp_epoch,
                tokens: out.tokens,
                key_term_ids: out.key_term_ids,
            });
        }
        let border = if commit {
            self.term_count_border = term_dict.get_count_border(self.term_count_border_rate);
            self.term_count_border
        } else {
            self.term_count_border
        };
        tracing::info!(border, "pass 1 complete: term census");
        let preterms = term_dict.snapshot();

        // Pass 2: phrase-tree build.
        for line in &cached {
            self.tree.register(&line.tokens, 1, &preterms, border);
        }
        self.pt_registered = true;
        tracing::info!("pass 2 complete: phrase tree built");

        if !self.pt_registered {
            return Err(crate::error::Error::TreeNotBuilt);
        }

        // Pass 3: phrase assignment.
        let mut results = Vec::with_capacity(cached.len());
        for line in &cached {
            let result = self.engine.register(
                &line.tokens,
                &line.key_term_ids,
                &self.tree,
                &preterms,
                border,
                &mut self.phrase_dict,
                1,
                line.timestamp_epoch,
                &line.original_line,
                true,
            );
            self.subjects.record(result.phrase_id, &line.original_line, &result.excludes, &preterms);
            results.push(DetectedLine {
                count: self.phrase_dict.get_count(result.phrase_id),
                original_line: line.original_line.clone(),
                template_string: render_template(&result.template, &preterms),
            });

            if commit {
                self.maybe_rollover(line.timestamp_epoch)?;
            }
        }
        tracing::info!(phrases = self.phrase_dict.curr_item_count(), "pass 3 complete: phrases assigned");

        if commit {
            self.term_dict.commit(false)?;
            self.phrase_dict.commit(false)?;
        }
        Ok(results)
    }

    /// Lockstep rollover: both stores roll together so a block of phrases and the block of terms
    /// it references share a retention watermark.
    fn maybe_rollover(&mut self, epoch: i64) -> Result<()> {
        let pos = retention_pos(epoch, self.frequency);
        let block_full = self
            .phrase_dict
            .block_store()
            .map(|s| self.phrase_dict.curr_item_count() >= s.block_size())
            .unwrap_or(false);

        if pos > self.curr_retention_pos || block_full {
            self.curr_retention_pos = pos;
            self.term_dict.next_block(epoch)?;
            self.phrase_dict.next_block(epoch)?;
        }
        Ok(())
    }

    /// Tokenizes `line` read-only (against a disposable snapshot of the term Dictionary) and
    /// reports the template it would resolve to, without registering anything. Backs the
    /// `analyze-line` CLI subcommand.
    pub fn analyze_line(&self, line: &str, file_epoch: i64) -> (String, Vec<TermId>) {
        let mut scratch = self.term_dict.snapshot();
        let out = self.tokenizer.tokenize(line, file_epoch, &mut scratch, 0, false, &self.words);
        let template = self.engine.build_template(&out.tokens, &out.key_term_ids, &self.tree, &scratch, self.term_count_border);
        (render_template(&template, &scratch), template)
    }

    /// `new_rate_or_border < 1.0` is read as a fresh `term_count_border_rate`; `≥ 1.0` is read as
    /// an absolute border value. Rebuilds the phrase Dictionary only if that resolves to a border
    /// strictly greater than the current one, per §4.7. Returns whether a rebuild happened.
    pub fn rearrange_phrases(&mut self, new_rate_or_border: f64) -> Result<bool> {
        let new_border = if new_rate_or_border >= 1.0 {
            new_rate_or_border as i64
        } else {
            self.term_dict.get_count_border(new_rate_or_border)
        };
        if new_border <= self.term_count_border {
            return Ok(false);
        }
        self.term_count_border = new_border;

        let old_ids: Vec<TermId> = self.phrase_dict.all_ids().collect();
        let mut tree = PhraseTree::new();
        let mut parsed: Vec<(Vec<TermId>, i64, i64, i64, String)> = Vec::with_capacity(old_ids.len());
        for id in &old_ids {
            let surface = self.phrase_dict.get_member(*id);
            let tokens: Vec<TermId> = surface
                .split(' ')
                .map(|w| if w == "*" { crate::consts::ASTERISK_TERM_ID } else { self.term_dict.get_item_id(w) })
                .collect();
            let count = self.phrase_dict.get_count(*id);
            tree.register(&tokens, count, &self.term_dict, self.term_count_border);
            parsed.push((
                tokens,
                count,
                self.phrase_dict.get_first_seen(*id),
                self.phrase_dict.get_last_seen(*id),
                self.phrase_dict.get_last_value(*id).to_string(),
            ));
        }

        let mut merged: std::collections::HashMap<String, (i64, i64, i64, String)> = std::collections::HashMap::new();
        for (tokens, count, first_seen, last_seen, last_value) in parsed {
            let template = self.engine.build_template(&tokens, &HashSet::new(), &tree, &self.term_dict, self.term_count_border);
            let rendered = render_template(&template, &self.term_dict);
            let entry = merged.entry(rendered).or_insert((0, i64::MAX, 0, String::new()));
            entry.0 += count;
            entry.1 = entry.1.min(first_seen);
            if last_seen >= entry.2 {
                entry.2 = last_seen;
                entry.3 = last_value;
            }
        }

        self.tree = tree;
        self.phrase_dict.rebuild(
            merged
                .into_iter()
                .map(|(surface, (count, first_seen, last_seen, last_value))| (surface, count, first_seen, last_seen, last_value)),
        );
        self.subjects = SubjectRegister::new();
        Ok(true)
    }
}

/// `day`: `year·1000 + yearday`. `hour`: `year·100000 + yearday·100 + hour`. `minute` extends the
/// same scheme one digit group further: `year·10000000 + yearday·10000 + hour·100 + minute`.
fn retention_pos(epoch: i64, frequency: Frequency) -> i64 {
    let dt = Local.timestamp_opt(epoch, 0).single().unwrap_or_else(|| Local.timestamp_opt(0, 0).unwrap());
    let year = dt.year() as i64;
    let yearday = dt.ordinal() as i64;
    match frequency {
        Frequency::Day => year * 1_000 + yearday,
        Frequency::Hour => year * 100_000 + yearday * 100 + dt.hour() as i64,
        Frequency::Minute => year * 10_000_000 + yearday * 10_000 + dt.hour() as i64 * 100 + dt.minute() as i64,
    }
}

pub fn render_template(template: &[TermId], term_dict: &Dictionary) -> String {
    template.iter().map(|&t| term_dict.get_member(t)).collect::<Vec<_>>().join(" ")
}
