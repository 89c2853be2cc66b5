//! C1 — Tokenizer: turns a raw line into a canonical sequence of term IDs.
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/trans.go` (`toTermList`,
//! `tokenizeLine`, the delimiter `strings.Replacer`, `parseLogFormat`) and
//! `pkg/utils/main.go`'s `Str2date` year-fill rule.

use std::collections::HashSet;

use chrono::format::{Parsed, StrftimeItems};
use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;

use crate::consts::{MAX_NUM_DIGITS, MAX_WORD_LEN, MIN_WORD_LEN};
use crate::dictionary::{Dictionary, TermId};
use crate::error::{Error, Result};
use crate::keywords::WordLists;
use crate::stopwords::is_stop_word;

/// The punctuation class replaced (as a run) by a single space, alongside whitespace.
const DELIM_CHARS: &str = "\"',;[]<>{}=()|:&?+/!.\r\n\t\\";

pub struct TokenizeOutput {
    pub timestamp_epoch: i64,
    pub message: String,
    pub tokens: Vec<TermId>,
    pub key_term_ids: HashSet<TermId>,
}

pub struct Tokenizer {
    delim_re: Regex,
    log_format_re: Option<Regex>,
    timestamp_group: Option<String>,
    message_group: Option<String>,
    timestamp_layout: Option<String>,
}

impl Tokenizer {
    pub fn new(log_format: Option<&str>, timestamp_layout: Option<&str>) -> Result<Self> {
        let alts: Vec<String> = DELIM_CHARS.chars().map(|c| regex::escape(&c.to_string())).collect();
        let delim_re = Regex::new(&format!(r"(?:\s|{})+", alts.join("|")))?;

        let (log_format_re, timestamp_group, message_group) = match log_format {
            Some(pattern) if !pattern.is_empty() => {
                let re = Regex::new(pattern)?;
                let names: Vec<&str> = re.capture_names().flatten().collect();
                let ts = names.iter().find(|n| **n == "timestamp").map(|s| s.to_string());
                let msg = names.iter().find(|n| **n == "message").map(|s| s.to_string());
                (Some(re), ts, msg)
            }
            _ => (None, None, None),
        };

        Ok(Tokenizer {
            delim_re,
            log_format_re,
            timestamp_group,
            message_group,
            timestamp_layout: timestamp_layout.map(str::to_string),
        })
    }

    /// Runs §4.1's algorithm. `file_epoch` is the fallback timestamp (the input file's
    /// modification epoch) used when no log-format regex is configured, or when the configured
    /// one fails to parse (a locally recovered `ParseError`, per §7).
    #[allow(clippy::too_many_arguments)]
    pub fn tokenize(
        &self,
        line: &str,
        file_epoch: i64,
        dict: &mut Dictionary,
        add_count: i64,
        is_new: bool,
        words: &WordLists,
    ) -> TokenizeOutput {
        let mut timestamp_epoch = file_epoch;
        let mut message = line;

        if let Some(re) = &self.log_format_re {
            if let Some(caps) = re.captures(line) {
                if let (Some(layout), Some(ts_name)) = (&self.timestamp_layout, &self.timestamp_group) {
                    if let Some(m) = caps.name(ts_name) {
                        match parse_timestamp(layout, m.as_str()) {
                            Ok(epoch) => timestamp_epoch = epoch,
                            Err(_) => {
                                tracing::warn!(captured = m.as_str(), "timestamp parse failed, falling back to file mtime");
                            }
                        }
                    }
                }
                if let Some(msg_name) = &self.message_group {
                    if let Some(m) = caps.name(msg_name) {
                        message = m.as_str();
                    }
                }
            }
        }

        let replaced = self.delim_re.replace_all(message, " ");
        let mut tokens = Vec::new();
        let mut key_term_ids = HashSet::new();

        for raw in replaced.split(' ') {
            if raw.is_empty() {
                continue;
            }
            if raw == "*" {
                // A literal `*` in the input (most commonly a phrase template's own surface form
                // being re-tokenized) round-trips to the same wildcard token rather than being
                // dropped by the length filter below.
                tokens.push(crate::consts::ASTERISK_TERM_ID);
                continue;
            }

            let lower_check = raw.to_lowercase();
            let is_keyword = words.is_keyword(&lower_check);

            // Masking to `*` (ignoreword, or stop word not promoted by the keyword set) always
            // survives to become the special token; the length/digit-count skip rules below only
            // apply to words that made it through unmasked.
            let masked = words.is_ignoreword(&lower_check) || (is_stop_word(&lower_check) && !is_keyword);
            if masked {
                tokens.push(crate::consts::ASTERISK_TERM_ID);
                continue;
            }

            let mut word = lower_check;
            if word.chars().count() > MAX_WORD_LEN {
                word = word.chars().take(MAX_WORD_LEN).collect();
            }
            if word.len() > 1 && word.ends_with('.') {
                word.pop();
            }

            if word.chars().count() < MIN_WORD_LEN && !is_keyword {
                continue;
            }
            if is_plain_integer(&word) && word.len() > MAX_NUM_DIGITS && !is_keyword {
                continue;
            }

            let term_id = dict.register(&word, add_count, timestamp_epoch, timestamp_epoch, line, is_new);
            tokens.push(term_id);
            if is_keyword {
                key_term_ids.insert(term_id);
            }
        }

        TokenizeOutput { timestamp_epoch, message: message.to_string(), tokens, key_term_ids }
    }
}

fn is_plain_integer(word: &str) -> bool {
    !word.is_empty() && !word.starts_with('0') && word.chars().all(|c| c.is_ascii_digit())
}

/// Parses `captured` with `layout` (a chrono strftime-style format string) in local time. When
/// `layout` has no year field, fills in the current year, rolling back one year if that would
/// put the parsed month ahead of the current month — "Jul 31" parsed on Mar 1 means last July.
fn parse_timestamp(layout: &str, captured: &str) -> Result<i64> {
    let mut parsed = Parsed::new();
    chrono::format::parse(&mut parsed, captured, StrftimeItems::new(layout))
        .map_err(|e| Error::Parse(format!("timestamp {captured:?} did not match layout {layout:?}: {e}")))?;

    if parsed.year.is_none() {
        let now = Local::now();
        let mut year = now.year();
        if let Some(month) = parsed.month {
            if month as i32 > now.month() as i32 {
                year -= 1;
            }
        }
        parsed
            .set_year(year as i64)
            .map_err(|e| Error::Parse(format!("could not fill in year: {e}")))?;
    }

    let date = parsed
        .to_naive_date()
        .map_err(|e| Error::Parse(format!("incomplete date in {captured:?}: {e}")))?;
    let time = parsed.to_naive_time().unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    let naive = NaiveDateTime::new(date, time);

    let local = Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::Parse(format!("ambiguous local time for {captured:?}")))?;
    Ok(local.timestamp())
}
