//! Offline/incremental rare-log mining engine: tokenization, phrase-template inference, and a
//! rotating on-disk store.
//!
//! `Engine` ties together the Pipeline (C6), Query/Export (C7), and Input iterator (C10) into the
//! facade an embedder or the CLI binary drives, grounded on `shankeleven-khoj/src/lib.rs`'s
//! `entry()`/`add_folder_to_model` orchestration shape.

pub mod block_store;
pub mod config;
pub mod consts;
pub mod dictionary;
pub mod error;
pub mod input;
pub mod keywords;
pub mod phrase_engine;
pub mod phrase_tree;
pub mod pipeline;
pub mod query;
pub mod stopwords;
pub mod subject;
pub mod tokenizer;

use std::fs;
use std::path::Path;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{DetectedLine, Pipeline};

use input::{Checkpoint, LineSource};

const CHECKPOINT_FILE: &str = "lastStatus.csv";

/// Opens a data directory, loading or creating its on-disk state, and offers the CLI-level
/// operations built on top of the mining [`Pipeline`].
pub struct Engine {
    config: Config,
    pipeline: Pipeline,
}

impl Engine {
    /// Opens `config.data_dir`, validating it against any persisted Configuration record and
    /// loading the term/phrase Dictionaries from their block stores.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir).map_err(|e| Error::Io { path: config.data_dir.clone(), source: e })?;

        let stored_path = stored_config_path(&config.data_dir);
        if stored_path.exists() {
            let stored = Config::load_file(&stored_path)?;
            let ring_empty = !config.data_dir.join("phrases").join("CircuitDBStatus").join("status.csv").exists();
            config.check_compatible(&stored, ring_empty)?;
        }
        if let Some(parent) = stored_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Io { path: parent.to_path_buf(), source: e })?;
        }
        fs::write(&stored_path, config.to_file_format()).map_err(|e| Error::Io { path: stored_path.clone(), source: e })?;

        let pipeline = Pipeline::open(&config)?;
        Ok(Engine { config, pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    fn checkpoint_path(&self) -> std::path::PathBuf {
        self.config.data_dir.join(CHECKPOINT_FILE)
    }

    fn load_checkpoint(&self) -> Checkpoint {
        fs::read_to_string(self.checkpoint_path())
            .ok()
            .and_then(|raw| {
                let mut parts = raw.trim().splitn(2, ',');
                let epoch: i64 = parts.next()?.parse().ok()?;
                let row: u64 = parts.next()?.parse().ok()?;
                Some(Checkpoint { last_file_epoch: epoch, last_file_row: row })
            })
            .unwrap_or_default()
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let path = self.checkpoint_path();
        fs::write(&path, format!("{},{}", checkpoint.last_file_epoch, checkpoint.last_file_row))
            .map_err(|e| Error::Io { path, source: e })
    }

    /// Walks every file matching `log_path` (or `self.config.log_path` when `None`), resuming
    /// from the saved checkpoint, and feeds the new lines through the Pipeline. Updates the
    /// checkpoint to the last line actually read, including on early-return (tracked
    /// incrementally — a later `Io` failure mid-scan does not re-process already-committed lines).
    pub fn feed(&mut self, log_path: Option<&str>) -> Result<usize> {
        let pattern = log_path.unwrap_or(&self.config.log_path).to_string();
        let checkpoint = self.load_checkpoint();
        let source = LineSource::new(&pattern, checkpoint)?;

        let mut batch = Vec::new();
        let mut last_seen = checkpoint;
        let mut processed = 0usize;
        for item in source {
            let line = item?;
            last_seen = Checkpoint { last_file_epoch: line.file_epoch, last_file_row: line.row };
            batch.push((line.file_epoch, line.text));
            processed += 1;
            if batch.len() >= crate::consts::LOG_PER_LINES {
                tracing::info!(lines = processed, "feed checkpoint");
                self.pipeline.feed(&batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.pipeline.feed(&batch)?;
        }
        self.save_checkpoint(last_seen)?;
        Ok(processed)
    }

    /// Runs `Detect()` over every line of `log_path` without committing or moving the checkpoint.
    /// A line's rendered template must match every `search_string` regex (when any are set) and
    /// none of the `exclude_string` regexes, per the Configuration record's filter fields.
    pub fn detect(&mut self, log_path: &str) -> Result<Vec<DetectedLine>> {
        let source = LineSource::new(log_path, Checkpoint::default())?;
        let lines: Vec<(i64, String)> =
            source.collect::<Result<Vec<_>>>()?.into_iter().map(|l| (l.file_epoch, l.text)).collect();

        let search: Vec<regex::Regex> =
            self.config.search_string.iter().map(|p| regex::Regex::new(p)).collect::<std::result::Result<_, _>>()?;
        let exclude: Vec<regex::Regex> =
            self.config.exclude_string.iter().map(|p| regex::Regex::new(p)).collect::<std::result::Result<_, _>>()?;

        self.pipeline.detect(&lines, move |template: &str| {
            search.iter().all(|re| re.is_match(template)) && !exclude.iter().any(|re| re.is_match(template))
        })
    }

    /// Feeds any new lines since the last checkpoint, then returns the top `n` rarest phrases.
    pub fn top_n(&mut self, n: usize, min_cnt: i64) -> Result<Vec<query::PhraseRow>> {
        self.feed(None)?;
        Ok(query::top_n(&self.pipeline, n, min_cnt))
    }

    pub fn output_phrases(&self, biggest_n: usize) -> Vec<query::PhraseRow> {
        query::output_phrases(&self.pipeline, biggest_n)
    }

    pub fn output_phrases_history(&self, biggest_n: usize) -> Result<Vec<query::HistoryRow>> {
        query::output_phrases_history(&self.pipeline, biggest_n, self.config.frequency)
    }

    pub fn term_counts(&self) -> Vec<(String, i64)> {
        query::term_counts(&self.pipeline)
    }

    pub fn analyze_line(&self, line: &str, file_epoch: i64) -> (String, Vec<dictionary::TermId>) {
        self.pipeline.analyze_line(line, file_epoch)
    }

    pub fn rearrange_phrases(&mut self, new_rate_or_border: f64) -> Result<bool> {
        self.pipeline.rearrange_phrases(new_rate_or_border)
    }

    /// Removes all on-disk state for this data directory, per the `clean` CLI subcommand.
    pub fn clean(&self) -> Result<()> {
        if self.config.data_dir.is_dir() {
            fs::remove_dir_all(&self.config.data_dir)
                .map_err(|e| Error::Io { path: self.config.data_dir.clone(), source: e })?;
        }
        Ok(())
    }
}

fn stored_config_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("config").join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config(data_dir: &Path, log_path: &str) -> Config {
        let mut cfg = Config::default();
        cfg.data_dir = data_dir.to_path_buf();
        cfg.log_path = log_path.to_string();
        cfg.block_size = 1000;
        cfg.max_blocks = 5;
        cfg.min_match_rate = 0.8;
        cfg
    }

    #[test]
    fn feed_processes_lines_and_persists_checkpoint() {
        let data_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let log_file = log_dir.path().join("a.log");
        let mut f = fs::File::create(&log_file).unwrap();
        writeln!(f, "alpha beta gamma delta").unwrap();
        writeln!(f, "alpha beta gamma delta").unwrap();

        let pattern = log_dir.path().join("*.log");
        let mut engine = Engine::open(base_config(data_dir.path(), pattern.to_str().unwrap())).unwrap();
        let processed = engine.feed(None).unwrap();
        assert_eq!(processed, 2);
        assert!(engine.checkpoint_path().exists());
    }

    #[test]
    fn reopening_with_incompatible_frequency_is_rejected() {
        let data_dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(data_dir.path(), "");
        cfg.frequency = block_store::Frequency::Day;
        {
            let engine = Engine::open(cfg.clone()).unwrap();
            engine.pipeline().term_dict();
        }
        let mut cfg2 = cfg;
        cfg2.frequency = block_store::Frequency::Hour;
        assert!(Engine::open(cfg2).is_err());
    }

    #[test]
    fn top_n_feeds_pending_lines_before_reporting() {
        let data_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let log_file = log_dir.path().join("a.log");
        let mut f = fs::File::create(&log_file).unwrap();
        writeln!(f, "never fed explicitly before querying").unwrap();

        let pattern = log_dir.path().join("*.log");
        let mut engine = Engine::open(base_config(data_dir.path(), pattern.to_str().unwrap())).unwrap();
        let rows = engine.top_n(10, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(engine.checkpoint_path().exists());
    }

    #[test]
    fn clean_removes_the_data_directory() {
        let data_dir = tempfile::tempdir().unwrap();
        let cfg = base_config(data_dir.path(), "");
        let engine = Engine::open(cfg).unwrap();
        engine.clean().unwrap();
        assert!(!data_dir.path().exists());
    }
}
