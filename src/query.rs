//! C7 — Query/Export: read-only reporting over a [`Pipeline`]'s two Dictionaries, plus
//! `rearrange_phrases`'s border-driven rebuild.
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/rare_phrases.go` (`showPhrases`,
//! `getHistory`) and `items.go`'s `getBiggestNItems`/`getIdf` used for the ranking.

use std::collections::HashMap;

use crate::block_store::Frequency;
use crate::dictionary::{ItemRow, TermId};
use crate::error::Result;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone)]
pub struct PhraseRow {
    pub phrase_id: TermId,
    pub created: i64,
    pub updated: i64,
    pub count: i64,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub phrase_id: TermId,
    pub subject: String,
    /// `(bucket_epoch, count)`; `None` marks a bucket with no activity.
    pub buckets: Vec<(i64, Option<i64>)>,
}

fn to_phrase_row(pipeline: &Pipeline, id: TermId) -> PhraseRow {
    let dict = pipeline.phrase_dict();
    PhraseRow {
        phrase_id: id,
        created: dict.get_first_seen(id),
        updated: dict.get_last_seen(id),
        count: dict.get_count(id),
        subject: pipeline.subjects().get(id).map(str::to_string).unwrap_or_else(|| dict.get_member(id).to_string()),
    }
}

/// Sorts phrases by count descending and takes the top `biggest_n`, per §4.7.
pub fn output_phrases(pipeline: &Pipeline, biggest_n: usize) -> Vec<PhraseRow> {
    pipeline.phrase_dict().biggest_n(biggest_n).into_iter().map(|id| to_phrase_row(pipeline, id)).collect()
}

/// Ranks by descending IDF, keeping only phrases with `count ≤ min_cnt` (when `min_cnt > 0`) and
/// `last_seen ≥ latest_update − n` days, then takes the top `n`.
pub fn top_n(pipeline: &Pipeline, n: usize, min_cnt: i64) -> Vec<PhraseRow> {
    let dict = pipeline.phrase_dict();
    let latest_update = dict.all_ids().map(|id| dict.get_last_seen(id)).max().unwrap_or(0);
    let cutoff = latest_update - (n as i64) * 86_400;

    let mut ids: Vec<TermId> = dict
        .all_ids()
        .filter(|&id| (min_cnt <= 0 || dict.get_count(id) <= min_cnt) && dict.get_last_seen(id) >= cutoff)
        .collect();
    ids.sort_by(|&a, &b| dict.get_idf(b).partial_cmp(&dict.get_idf(a)).unwrap_or(std::cmp::Ordering::Equal));
    ids.truncate(n);
    ids.into_iter().map(|id| to_phrase_row(pipeline, id)).collect()
}

/// Every term's surface form and current count, descending by count.
pub fn term_counts(pipeline: &Pipeline) -> Vec<(String, i64)> {
    let dict = pipeline.term_dict();
    let mut rows: Vec<(String, i64)> =
        dict.all_ids().map(|id| (dict.get_member(id).to_string(), dict.get_count(id))).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows
}

/// Buckets each of the top `biggest_n` phrases' historical counts by
/// `(last_epoch / unit_secs) * unit_secs`, reading every live block of the phrase store. Missing
/// buckets between a phrase's first and last active bucket are reported as `None`.
pub fn output_phrases_history(pipeline: &Pipeline, biggest_n: usize, frequency: Frequency) -> Result<Vec<HistoryRow>> {
    let dict = pipeline.phrase_dict();
    let top = dict.biggest_n(biggest_n);
    let unit_secs = frequency.unit_seconds();

    let mut per_phrase: HashMap<TermId, HashMap<i64, i64>> = HashMap::new();
    if let Some(store) = dict.block_store() {
        for (block_no, last_epoch) in store.block_epochs() {
            let bucket = (last_epoch / unit_secs) * unit_secs;
            let rows: Vec<ItemRow> = store.read_block(block_no)?;
            for row in rows {
                let id = dict.get_item_id(&row.item);
                if top.contains(&id) {
                    *per_phrase.entry(id).or_default().entry(bucket).or_insert(0) += row.count;
                }
            }
        }
    }

    let mut out = Vec::with_capacity(top.len());
    for id in top {
        let subject = pipeline.subjects().get(id).map(str::to_string).unwrap_or_else(|| dict.get_member(id).to_string());
        let Some(buckets_map) = per_phrase.get(&id) else {
            out.push(HistoryRow { phrase_id: id, subject, buckets: Vec::new() });
            continue;
        };
        let min_t = *buckets_map.keys().min().unwrap();
        let max_t = *buckets_map.keys().max().unwrap();
        let mut buckets = Vec::new();
        let mut t = min_t;
        while t <= max_t {
            buckets.push((t, buckets_map.get(&t).copied()));
            t += unit_secs;
        }
        out.push(HistoryRow { phrase_id: id, subject, buckets });
    }
    Ok(out)
}
