//! C9 — Configuration record and file loader.
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/vars.go` (the field set of the
//! Configuration record) and its `.tbl.ini` group-definition convention for on-disk tables,
//! adapted into a flat `key = value` file parsed the way `shankeleven-khoj`'s CLI reads its own
//! plain-text rule files, with `{{NAME}}` environment substitution layered on top.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::block_store::Frequency;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_path: String,
    pub search_string: Vec<String>,
    pub exclude_string: Vec<String>,
    pub log_format: String,
    pub timestamp_layout: String,
    pub block_size: usize,
    pub max_blocks: usize,
    pub retention: i64,
    pub frequency: Frequency,
    pub min_match_rate: f64,
    pub max_match_rate: f64,
    pub term_count_border_rate: f64,
    pub term_count_border: i64,
    pub use_gzip: bool,
    pub use_custom_phrases: bool,
    pub keywords: Vec<String>,
    pub ignorewords: Vec<String>,
    pub phrases: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::new(),
            log_path: String::new(),
            search_string: Vec::new(),
            exclude_string: Vec::new(),
            log_format: String::new(),
            timestamp_layout: String::new(),
            block_size: 10_000,
            max_blocks: 10,
            retention: 0,
            frequency: Frequency::Day,
            min_match_rate: crate::consts::DEFAULT_MIN_MATCH_RATE,
            max_match_rate: crate::consts::DEFAULT_MAX_MATCH_RATE,
            term_count_border_rate: crate::consts::DEFAULT_TERM_COUNT_BORDER_RATE,
            term_count_border: 0,
            use_gzip: false,
            use_custom_phrases: false,
            keywords: Vec::new(),
            ignorewords: Vec::new(),
            phrases: Vec::new(),
        }
    }
}

const RECOGNIZED_KEYS: &[&str] = &[
    "dataDir",
    "logPath",
    "searchString",
    "excludeString",
    "logFormat",
    "timestampLayout",
    "retention",
    "frequency",
    "minMatchRate",
    "maxMatchRate",
    "termCountBorderRate",
    "termCountBorder",
    "blockSize",
    "maxBlocks",
    "useGzip",
    "useCustomPhrases",
    "keywords",
    "ignorewords",
    "phrases",
];

impl Config {
    /// Parses an INI-style `key = value` file, one setting per line, `#` starting a comment.
    /// List-valued keys (`searchString`, `excludeString`, `keywords`, `ignorewords`, `phrases`)
    /// are comma-separated. `{{NAME}}` in any value is substituted with the environment variable
    /// `NAME` before parsing, per §6.
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut values: HashMap<String, String> = HashMap::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("malformed line (expected key = value): {line}")))?;
            let key = key.trim().to_string();
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                return Err(Error::Config(format!("unknown configuration key: {key}")));
            }
            values.insert(key, substitute_env(value.trim()));
        }

        let mut cfg = Config::default();
        if let Some(v) = values.get("dataDir") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = values.get("logPath") {
            cfg.log_path = v.clone();
        }
        if let Some(v) = values.get("searchString") {
            cfg.search_string = split_list(v);
        }
        if let Some(v) = values.get("excludeString") {
            cfg.exclude_string = split_list(v);
        }
        if let Some(v) = values.get("logFormat") {
            cfg.log_format = v.clone();
        }
        if let Some(v) = values.get("timestampLayout") {
            cfg.timestamp_layout = v.clone();
        }
        if let Some(v) = values.get("retention") {
            cfg.retention = parse_num(v, "retention")?;
        }
        if let Some(v) = values.get("frequency") {
            cfg.frequency = Frequency::parse(v)?;
        }
        if let Some(v) = values.get("minMatchRate") {
            cfg.min_match_rate = parse_float(v, "minMatchRate")?;
        }
        if let Some(v) = values.get("maxMatchRate") {
            cfg.max_match_rate = parse_float(v, "maxMatchRate")?;
        }
        if let Some(v) = values.get("termCountBorderRate") {
            cfg.term_count_border_rate = parse_float(v, "termCountBorderRate")?;
        }
        if let Some(v) = values.get("termCountBorder") {
            cfg.term_count_border = parse_num(v, "termCountBorder")?;
        }
        if let Some(v) = values.get("blockSize") {
            cfg.block_size = parse_num::<i64>(v, "blockSize")?.max(1) as usize;
        }
        if let Some(v) = values.get("maxBlocks") {
            cfg.max_blocks = parse_num::<i64>(v, "maxBlocks")?.max(1) as usize;
        }
        if let Some(v) = values.get("useGzip") {
            cfg.use_gzip = v == "true" || v == "1";
        }
        if let Some(v) = values.get("useCustomPhrases") {
            cfg.use_custom_phrases = v == "true" || v == "1";
        }
        if let Some(v) = values.get("keywords") {
            cfg.keywords = split_list(v);
        }
        if let Some(v) = values.get("ignorewords") {
            cfg.ignorewords = split_list(v);
        }
        if let Some(v) = values.get("phrases") {
            cfg.phrases = v.split(';').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.log_format.is_empty() {
            Regex::new(&self.log_format)
                .map_err(|e| Error::Config(format!("invalid logFormat regex: {e}")))?;
        }
        if self.block_size == 0 {
            return Err(Error::Config("blockSize must be positive".into()));
        }
        if self.max_blocks == 0 {
            return Err(Error::Config("maxBlocks must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.min_match_rate) {
            return Err(Error::Config("minMatchRate must be within [0, 1]".into()));
        }
        Ok(())
    }

    /// Renders the same `key = value` shape `load_file` parses, used to persist the effective
    /// Configuration alongside a data directory so a later run can detect drift.
    pub fn to_file_format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("dataDir = {}\n", self.data_dir.display()));
        out.push_str(&format!("logPath = {}\n", self.log_path));
        out.push_str(&format!("searchString = {}\n", self.search_string.join(",")));
        out.push_str(&format!("excludeString = {}\n", self.exclude_string.join(",")));
        out.push_str(&format!("logFormat = {}\n", self.log_format));
        out.push_str(&format!("timestampLayout = {}\n", self.timestamp_layout));
        out.push_str(&format!("blockSize = {}\n", self.block_size));
        out.push_str(&format!("maxBlocks = {}\n", self.max_blocks));
        out.push_str(&format!("retention = {}\n", self.retention));
        out.push_str(&format!("frequency = {}\n", self.frequency.as_str()));
        out.push_str(&format!("minMatchRate = {}\n", self.min_match_rate));
        out.push_str(&format!("maxMatchRate = {}\n", self.max_match_rate));
        out.push_str(&format!("termCountBorderRate = {}\n", self.term_count_border_rate));
        out.push_str(&format!("termCountBorder = {}\n", self.term_count_border));
        out.push_str(&format!("useGzip = {}\n", self.use_gzip));
        out.push_str(&format!("useCustomPhrases = {}\n", self.use_custom_phrases));
        out.push_str(&format!("keywords = {}\n", self.keywords.join(",")));
        out.push_str(&format!("ignorewords = {}\n", self.ignorewords.join(",")));
        out.push_str(&format!("phrases = {}\n", self.phrases.join(";")));
        out
    }

    /// Rejects a `block_size`/`max_blocks`/`frequency` change against an already-populated ring,
    /// per §6's persisted-state compatibility rule.
    pub fn check_compatible(&self, stored: &Config, ring_is_empty: bool) -> Result<()> {
        if self.frequency != stored.frequency {
            return Err(Error::RetentionMismatch);
        }
        if !ring_is_empty && (self.block_size != stored.block_size || self.max_blocks != stored.max_blocks) {
            return Err(Error::Config(
                "block_size/max_blocks cannot change while the ring holds data".into(),
            ));
        }
        Ok(())
    }
}

fn substitute_env(value: &str) -> String {
    static PLACEHOLDER: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());
    PLACEHOLDER
        .replace_all(value, |caps: &regex::Captures| env::var(&caps[1]).unwrap_or_default())
        .into_owned()
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn parse_num<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value.parse().map_err(|_| Error::Config(format!("invalid integer for {field}: {value}")))
}

fn parse_float(value: &str, field: &str) -> Result<f64> {
    value.parse().map_err(|_| Error::Config(format!("invalid number for {field}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_recognized_keys_and_substitutes_env() {
        env::set_var("RLD_TEST_PATH", "/var/log/app");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "logPath = {{{{RLD_TEST_PATH}}}}/*.log").unwrap();
        writeln!(f, "frequency = hour").unwrap();
        writeln!(f, "minMatchRate = 0.75").unwrap();
        let cfg = Config::load_file(&path).unwrap();
        assert_eq!(cfg.log_path, "/var/log/app/*.log");
        assert_eq!(cfg.frequency, Frequency::Hour);
        assert_eq!(cfg.min_match_rate, 0.75);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "bogusKey = 1\n").unwrap();
        assert!(Config::load_file(&path).is_err());
    }

    #[test]
    fn invalid_log_format_regex_fails_validation() {
        let mut cfg = Config::default();
        cfg.log_format = "(unclosed".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn frequency_mismatch_is_retention_mismatch() {
        let mut a = Config::default();
        a.frequency = Frequency::Day;
        let mut b = Config::default();
        b.frequency = Frequency::Hour;
        assert!(matches!(a.check_compatible(&b, true), Err(Error::RetentionMismatch)));
    }

    #[test]
    fn ring_size_change_on_nonempty_ring_is_rejected() {
        let a = Config::default();
        let mut b = Config::default();
        b.block_size = 99;
        assert!(a.check_compatible(&b, false).is_err());
        assert!(a.check_compatible(&b, true).is_ok());
    }
}
