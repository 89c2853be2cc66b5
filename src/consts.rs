//! Fixed constants carried over from the mining engine's original tuning.

/// HTTP status codes and similar numeric tokens: digits beyond this width are dropped.
pub const MAX_NUM_DIGITS: usize = 3;
/// IPv6 addresses and long identifiers are truncated to this width.
pub const MAX_WORD_LEN: usize = 40;
/// Words shorter than this (and not a keyword) are dropped.
pub const MIN_WORD_LEN: usize = 3;

pub const DEFAULT_TERM_COUNT_BORDER_RATE: f64 = 0.001;
pub const DEFAULT_MIN_MATCH_RATE: f64 = 0.6;
pub const DEFAULT_MAX_MATCH_RATE: f64 = 0.0;

/// Progress checkpoint used by the CLI's `feed` loop.
pub const LOG_PER_LINES: usize = 1_000_000;

/// Reserved term ID standing in for "any token in this position".
pub const ASTERISK_TERM_ID: i64 = -1;

/// Block-number zero padding used in on-disk block file names (`BLK0000000000.csv[.gz]`).
pub const BLOCK_ID_DIGITS: usize = 10;
