//! C10 — Input iteration: a thin I/O shim that walks a glob of log files, oldest-mtime first, and
//! resumes from a saved checkpoint. None of the mining algorithm lives here.
//!
//! Grounded on `shankeleven-khoj/src/lib.rs`'s `add_folder_to_model` directory walk (here driven
//! by a glob instead of `walkdir`, per §6's `logPath` pattern field) and
//! `examples/original_source/pkg/utils/main.go`'s mtime-ordered multi-file replay with a
//! `lastStatus` resume checkpoint.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, WithPath};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub last_file_epoch: i64,
    pub last_file_row: u64,
}

pub struct FileLine {
    pub path: PathBuf,
    pub file_epoch: i64,
    pub row: u64,
    pub text: String,
}

/// Iterates lines across every file matching `pattern`, oldest modification time first (ties
/// broken by path), resuming after `checkpoint` so a re-run over a growing file only re-delivers
/// rows written since the checkpoint's file.
pub struct LineSource {
    files: Vec<(PathBuf, i64)>,
    file_idx: usize,
    reader: Option<BufReader<fs::File>>,
    pending_path: Option<PathBuf>,
    current_epoch: i64,
    row: u64,
    checkpoint: Checkpoint,
}

impl LineSource {
    pub fn new(pattern: &str, checkpoint: Checkpoint) -> Result<Self> {
        let mut files: Vec<(PathBuf, i64)> = Vec::new();
        for entry in glob::glob(pattern).map_err(|e| Error::Config(format!("invalid logPath glob {pattern:?}: {e}")))? {
            let path = entry.map_err(|e| Error::Parse(format!("glob walk error: {e}")))?;
            let meta = fs::metadata(&path).with_path(&path)?;
            let epoch = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            files.push((path, epoch));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        files.retain(|(_, epoch)| *epoch >= checkpoint.last_file_epoch);

        Ok(LineSource { files, file_idx: 0, reader: None, pending_path: None, current_epoch: 0, row: 0, checkpoint })
    }

    fn open_next(&mut self) -> Result<bool> {
        if self.file_idx >= self.files.len() {
            return Ok(false);
        }
        let (path, epoch) = self.files[self.file_idx].clone();
        self.file_idx += 1;
        self.current_epoch = epoch;
        self.row = if epoch == self.checkpoint.last_file_epoch { self.checkpoint.last_file_row } else { 0 };
        let file = fs::File::open(&path).with_path(&path)?;
        let mut reader = BufReader::new(file);
        for _ in 0..self.row {
            let mut discard = String::new();
            if reader.read_line(&mut discard).with_path(&path)? == 0 {
                break;
            }
        }
        self.reader = Some(reader);
        self.pending_path = Some(path);
        Ok(true)
    }
}

impl Iterator for LineSource {
    type Item = Result<FileLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.reader.is_none() {
                match self.open_next() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }
            let path = self.pending_path.clone().expect("reader implies path");
            let reader = self.reader.as_mut().unwrap();
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    self.reader = None;
                    continue;
                }
                Ok(_) => {
                    let text = line.trim_end_matches(['\n', '\r']).to_string();
                    self.row += 1;
                    return Some(Ok(FileLine { path, file_epoch: self.current_epoch, row: self.row, text }));
                }
                Err(e) => return Some(Err(Error::Io { path, source: e })),
            }
        }
    }
}
