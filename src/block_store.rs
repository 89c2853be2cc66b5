//! C3 — Block Store: a Dictionary backed by a ring of `max_blocks` on-disk block files,
//! optionally gzip-compressed, with a sibling status table recording block watermarks.
//!
//! Grounded on `examples/original_source/pkg/csvdb/circuit_db.go` (`NextBlock`,
//! `UpdateBlockStatus`, `deleteOldBlocks`, `getBlockTableName`) and `table.go` (row read/write).
//! Generalized from the original's untyped `[]string` rows to a generic row type `R` that
//! round-trips through `csv`'s `serde` integration, since Rust gives us that for free.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::consts::BLOCK_ID_DIGITS;
use crate::error::{Error, Result, WithPath};

/// `frequency` unit mapped to seconds, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Minute,
    Hour,
    Day,
}

impl Frequency {
    pub fn unit_seconds(self) -> i64 {
        match self {
            Frequency::Minute => 60,
            Frequency::Hour => 3600,
            Frequency::Day => 86_400,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "minute" => Ok(Frequency::Minute),
            "hour" => Ok(Frequency::Hour),
            "day" => Ok(Frequency::Day),
            other => Err(Error::Config(format!("unknown frequency {other:?}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRow {
    last_index: i64,
    block_no: usize,
    block_id: String,
    row_count: usize,
    last_epoch: i64,
    completed: bool,
}

/// On-disk layout and in-memory watermark state for one Dictionary's ring of blocks.
pub struct BlockStore {
    root: PathBuf,
    max_blocks: usize,
    block_size: usize,
    retention: i64,
    unit_secs: i64,
    use_gzip: bool,
    block_no: usize,
    last_index: i64,
    last_epoch: i64,
    curr_row_count: usize,
    status: Vec<StatusRow>,
}

impl BlockStore {
    pub fn open(
        root: impl Into<PathBuf>,
        max_blocks: usize,
        block_size: usize,
        retention: i64,
        frequency: Frequency,
        use_gzip: bool,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_path(&root)?;
        fs::create_dir_all(root.join("CircuitDBStatus")).with_path(&root)?;
        Ok(BlockStore {
            root,
            max_blocks: max_blocks.max(1),
            block_size,
            retention,
            unit_secs: frequency.unit_seconds(),
            use_gzip,
            block_no: 0,
            last_index: 0,
            last_epoch: 0,
            curr_row_count: 0,
            status: Vec::new(),
        })
    }

    pub fn block_no(&self) -> usize {
        self.block_no
    }

    pub fn last_epoch(&self) -> i64 {
        self.last_epoch
    }

    pub fn curr_row_count(&self) -> usize {
        self.curr_row_count
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
    }

    pub fn set_max_blocks(&mut self, max_blocks: usize) {
        self.max_blocks = max_blocks.max(1);
    }

    fn status_path(&self) -> PathBuf {
        self.root.join("CircuitDBStatus").join("status.csv")
    }

    fn block_id(block_no: usize) -> String {
        format!("BLK{block_no:0width$}", width = BLOCK_ID_DIGITS)
    }

    fn block_path(&self, block_no: usize) -> PathBuf {
        let name = Self::block_id(block_no);
        if self.use_gzip {
            self.root.join(format!("{name}.csv.gz"))
        } else {
            self.root.join(format!("{name}.csv"))
        }
    }

    fn current_block_path(&self) -> PathBuf {
        self.block_path(self.block_no)
    }

    fn write_status(&self) -> Result<()> {
        let path = self.status_path();
        let file = File::create(&path).with_path(&path)?;
        let mut w = csv::Writer::from_writer(BufWriter::new(file));
        for row in &self.status {
            w.serialize(row)?;
        }
        w.flush().with_path(&path)?;
        Ok(())
    }

    fn read_status(&self) -> Result<Vec<StatusRow>> {
        let path = self.status_path();
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).with_path(&path)?;
        let mut r = csv::Reader::from_reader(BufReader::new(file));
        let mut rows = Vec::new();
        for rec in r.deserialize() {
            rows.push(rec?);
        }
        Ok(rows)
    }

    /// Appends `rows` to the current (open) block, creating it if this is the first write since
    /// the block was last rotated into.
    pub fn append_rows<R: Serialize>(&mut self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.current_block_path();
        let exists = path.is_file();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_path(&path)?;
        let writer: Box<dyn Write> = if self.use_gzip {
            Box::new(GzEncoder::new(file, Compression::default()))
        } else {
            Box::new(BufWriter::new(file))
        };
        let mut w = csv::WriterBuilder::new().has_headers(!exists).from_writer(writer);
        for row in rows {
            w.serialize(row)?;
        }
        w.flush().with_path(&path)?;
        self.curr_row_count += rows.len();
        Ok(())
    }

    /// Overwrites the current block wholesale, used when a reused block's prior rows must be
    /// fully replaced rather than appended to (§4.3's "truncate/overwrite the now-reused block").
    pub fn overwrite_rows<R: Serialize>(&mut self, rows: &[R]) -> Result<()> {
        let path = self.current_block_path();
        if path.is_file() {
            fs::remove_file(&path).with_path(&path)?;
        }
        self.curr_row_count = 0;
        self.append_rows(rows)
    }

    /// Reads every row of a specific block, decompressing if needed.
    pub fn read_block<R: DeserializeOwned>(&self, block_no: usize) -> Result<Vec<R>> {
        let path = self.block_path(block_no);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).with_path(&path)?;
        let reader: Box<dyn Read> = if self.use_gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(BufReader::new(file))
        };
        let mut r = csv::Reader::from_reader(reader);
        let mut rows = Vec::new();
        for rec in r.deserialize() {
            rows.push(rec?);
        }
        Ok(rows)
    }

    pub fn read_current_block<R: DeserializeOwned>(&self) -> Result<Vec<R>> {
        self.read_block(self.block_no)
    }

    /// Block numbers with a live status row, in ascending order.
    pub fn live_block_nos(&self) -> Vec<usize> {
        let mut nos: Vec<usize> = self.status.iter().map(|s| s.block_no).collect();
        nos.sort_unstable();
        nos
    }

    /// `(block_no, last_epoch)` for every live block, used to bucket a block's rows by time for
    /// history reporting.
    pub fn block_epochs(&self) -> Vec<(usize, i64)> {
        self.status.iter().map(|s| (s.block_no, s.last_epoch)).collect()
    }

    pub fn is_block_completed(&self, block_no: usize) -> bool {
        self.status.iter().any(|s| s.block_no == block_no && s.completed)
    }

    /// Upserts the status row for the current block, then evicts anything retention has aged out.
    pub fn update_block_status(&mut self, completed: bool) -> Result<()> {
        let block_id = Self::block_id(self.block_no);
        let row = StatusRow {
            last_index: self.last_index,
            block_no: self.block_no,
            block_id,
            row_count: self.curr_row_count,
            last_epoch: self.last_epoch,
            completed,
        };
        if let Some(existing) = self.status.iter_mut().find(|s| s.block_no == self.block_no) {
            *existing = row;
        } else {
            self.status.push(row);
        }
        self.write_status()?;
        self.delete_old_blocks()
    }

    /// Drops every block whose watermark has aged past `retention` units, per §4.3/§8 property 4.
    pub fn delete_old_blocks(&mut self) -> Result<()> {
        if self.retention <= 0 {
            return Ok(());
        }
        let cutoff = self.last_epoch - self.retention * self.unit_secs + 1;
        let old_status = std::mem::take(&mut self.status);
        let mut kept = Vec::with_capacity(old_status.len());
        for row in old_status {
            if row.last_epoch < cutoff {
                let path = self.block_path(row.block_no);
                if path.is_file() {
                    fs::remove_file(&path).with_path(&path)?;
                }
            } else {
                kept.push(row);
            }
        }
        self.status = kept;
        self.write_status()
    }

    /// Flushes the current block, marks it completed, and advances to the next ring slot.
    /// `subtract_block` lets the caller (the Dictionary) remove the about-to-be-overwritten
    /// block's previous contribution from its in-memory counts before new rows land on top of it,
    /// per §4.3's reuse invariant.
    pub fn next_block<R, F>(&mut self, last_epoch: i64, mut subtract_block: F) -> Result<()>
    where
        R: DeserializeOwned,
        F: FnMut(Vec<R>) -> Result<()>,
    {
        self.last_epoch = last_epoch;
        self.update_block_status(true)?;

        self.curr_row_count = 0;
        self.block_no = (self.block_no + 1) % self.max_blocks;
        self.last_index += 1;

        let stale_rows: Vec<R> = self.read_current_block()?;
        if !stale_rows.is_empty() {
            subtract_block(stale_rows)?;
        }
        let path = self.current_block_path();
        if path.is_file() {
            fs::remove_file(&path).with_path(&path)?;
        }
        Ok(())
    }

    /// Restores ring position from the status table and returns every surviving block's rows,
    /// in block order, for the caller to fold back into its in-memory maps.
    pub fn load<R: DeserializeOwned>(&mut self) -> Result<Vec<(usize, Vec<R>)>> {
        self.status = self.read_status()?;
        if self.status.is_empty() {
            return Ok(Vec::new());
        }

        let last = self.status.iter().max_by_key(|s| s.last_index).cloned().unwrap();
        self.block_no = last.block_no;
        self.last_index = last.last_index;
        self.last_epoch = last.last_epoch;
        self.curr_row_count = last.row_count;

        if last.completed {
            self.block_no = (self.block_no + 1) % self.max_blocks;
            self.curr_row_count = 0;
        }

        let mut out = Vec::new();
        for block_no in self.live_block_nos() {
            let rows: Vec<R> = self.read_block(block_no)?;
            out.push((block_no, rows));
        }
        Ok(out)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        count: i64,
        item: String,
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            BlockStore::open(dir.path().join("terms"), 4, 100, 0, Frequency::Day, false).unwrap();
        store
            .append_rows(&[Row { count: 1, item: "foo".into() }, Row { count: 2, item: "bar".into() }])
            .unwrap();
        let rows: Vec<Row> = store.read_current_block().unwrap();
        assert_eq!(rows, vec![Row { count: 1, item: "foo".into() }, Row { count: 2, item: "bar".into() }]);
    }

    #[test]
    fn ring_wraps_after_max_blocks_rollovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            BlockStore::open(dir.path().join("terms"), 3, 10, 0, Frequency::Day, false).unwrap();
        for epoch in 1..=7i64 {
            store.append_rows(&[Row { count: 1, item: format!("t{epoch}") }]).unwrap();
            store.next_block::<Row, _>(epoch, |_| Ok(())).unwrap();
        }
        assert_eq!(store.status.len(), 3);
        let mut nos = store.live_block_nos();
        nos.sort_unstable();
        assert_eq!(nos, vec![0, 1, 2]);
    }

    #[test]
    fn retention_evicts_blocks_older_than_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            BlockStore::open(dir.path().join("terms"), 10, 10, 2, Frequency::Day, false).unwrap();
        let day = Frequency::Day.unit_seconds();
        for day_no in 0..5i64 {
            store.append_rows(&[Row { count: 1, item: format!("d{day_no}") }]).unwrap();
            store.next_block::<Row, _>(day_no * day, |_| Ok(())).unwrap();
        }
        for row in &store.status {
            assert!(row.last_epoch >= (4 * day) - 2 * day + 1);
        }
    }

    #[test]
    fn gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            BlockStore::open(dir.path().join("terms"), 4, 100, 0, Frequency::Day, true).unwrap();
        store.append_rows(&[Row { count: 5, item: "gz".into() }]).unwrap();
        let rows: Vec<Row> = store.read_current_block().unwrap();
        assert_eq!(rows, vec![Row { count: 5, item: "gz".into() }]);
    }
}
