//! C2 — Dictionary: a bidirectional string↔ID map with counts, first/last-seen epochs, and a
//! last raw value, optionally backed by a [`BlockStore`] (C3).
//!
//! Grounded on `examples/original_source/internal/rarelogdetector/items.go` (`register`,
//! `getIdf`, `getCount`, `getCountBorder`, `next`/`flush`/`commit`), generalized from the
//! teacher's `shankeleven-khoj/src/model.rs` two-map (`TermFreq`/`DocFreq`) bookkeeping style and
//! its `compute_idf` formula shape.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block_store::{BlockStore, Frequency};
use crate::error::{Error, Result};

pub type TermId = i64;

/// Sentinel returned by [`Dictionary::register`] for an empty surface form (§4.2's
/// non-fatal `EmptySurface` outcome) and by lookups that miss.
pub const NOT_FOUND: TermId = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRow {
    pub count: i64,
    #[serde(rename = "createEpoch")]
    pub create_epoch: i64,
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
    pub item: String,
    #[serde(rename = "lastValue")]
    pub last_value: String,
}

#[derive(Debug, Default, Clone)]
struct Entry {
    count: i64,
    first_seen: i64,
    last_seen: i64,
    last_value: String,
}

/// A string↔ID map with counts and timestamps, optionally persisted as a rotating block store.
pub struct Dictionary {
    name: String,
    max_id: TermId,
    members: HashMap<String, TermId>,
    member_map: HashMap<TermId, String>,
    entries: HashMap<TermId, Entry>,
    curr_counts: HashMap<TermId, i64>,
    curr_updates: HashMap<TermId, i64>,
    curr_create_epochs: HashMap<TermId, i64>,
    curr_item_count: usize,
    total_count: i64,
    store: Option<BlockStore>,
}

impl Dictionary {
    pub fn new(name: impl Into<String>) -> Self {
        Dictionary {
            name: name.into(),
            max_id: 0,
            members: HashMap::new(),
            member_map: HashMap::new(),
            entries: HashMap::new(),
            curr_counts: HashMap::new(),
            curr_updates: HashMap::new(),
            curr_create_epochs: HashMap::new(),
            curr_item_count: 0,
            total_count: 0,
            store: None,
        }
    }

    pub fn with_store(
        name: impl Into<String>,
        data_dir: &Path,
        max_blocks: usize,
        block_size: usize,
        retention: i64,
        frequency: Frequency,
        use_gzip: bool,
    ) -> Result<Self> {
        let name = name.into();
        let store = BlockStore::open(
            data_dir.join(&name),
            max_blocks,
            block_size,
            retention,
            frequency,
            use_gzip,
        )?;
        let mut dict = Dictionary::new(name);
        dict.store = Some(store);
        Ok(dict)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn curr_item_count(&self) -> usize {
        self.curr_item_count
    }

    pub fn block_store(&self) -> Option<&BlockStore> {
        self.store.as_ref()
    }

    pub fn block_store_mut(&mut self) -> Option<&mut BlockStore> {
        self.store.as_mut()
    }

    /// Upserts `surface`. Returns [`NOT_FOUND`] for an empty surface form (non-fatal, per §4.2).
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        surface: &str,
        add_count: i64,
        create_epoch: i64,
        last_epoch: i64,
        last_value: &str,
        is_new: bool,
    ) -> TermId {
        if surface.is_empty() {
            return NOT_FOUND;
        }

        let id = match self.members.get(surface) {
            Some(&id) => {
                let entry = self.entries.get_mut(&id).expect("member implies entry");
                if last_epoch > entry.last_seen {
                    entry.last_seen = last_epoch;
                }
                if create_epoch > 0 && (entry.first_seen == 0 || create_epoch < entry.first_seen) {
                    entry.first_seen = create_epoch;
                }
                id
            }
            None => {
                self.max_id += 1;
                let id = self.max_id;
                self.members.insert(surface.to_string(), id);
                self.member_map.insert(id, surface.to_string());
                self.entries.insert(
                    id,
                    Entry { count: 0, first_seen: create_epoch, last_seen: last_epoch, last_value: String::new() },
                );
                if is_new {
                    self.curr_item_count += 1;
                }
                id
            }
        };

        if add_count == 0 {
            return id;
        }

        let entry = self.entries.get_mut(&id).expect("just inserted or found");
        entry.count += add_count;
        if add_count > 0 && !last_value.is_empty() {
            entry.last_value = last_value.to_string();
        }
        self.total_count += add_count;

        if is_new {
            *self.curr_counts.entry(id).or_insert(0) += add_count;
            let update_slot = self.curr_updates.entry(id).or_insert(last_epoch);
            if last_epoch > *update_slot {
                *update_slot = last_epoch;
            }
            self.curr_create_epochs.entry(id).or_insert(create_epoch);
        }

        id
    }

    pub fn get_member(&self, id: TermId) -> &str {
        if id < 0 {
            return "*";
        }
        self.member_map.get(&id).map(String::as_str).unwrap_or("")
    }

    pub fn get_item_id(&self, surface: &str) -> TermId {
        self.members.get(surface).copied().unwrap_or(NOT_FOUND)
    }

    pub fn get_count(&self, id: TermId) -> i64 {
        self.entries.get(&id).map(|e| e.count).unwrap_or(0)
    }

    pub fn get_first_seen(&self, id: TermId) -> i64 {
        self.entries.get(&id).map(|e| e.first_seen).unwrap_or(0)
    }

    pub fn get_last_seen(&self, id: TermId) -> i64 {
        self.entries.get(&id).map(|e| e.last_seen).unwrap_or(0)
    }

    pub fn get_last_value(&self, id: TermId) -> &str {
        self.entries.get(&id).map(|e| e.last_value.as_str()).unwrap_or("")
    }

    pub fn get_idf(&self, id: TermId) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let count = self.get_count(id);
        if count == 0 {
            return 0.0;
        }
        (self.total_count as f64 / count as f64).ln() + 1.0
    }

    /// The rarity threshold: the smallest count at/just-below the point where cumulative mass
    /// first reaches `rate` of the total, per §4.2. Never returns 0.
    pub fn get_count_border(&self, rate: f64) -> i64 {
        if self.total_count <= 0 {
            return 1;
        }
        let mut counts: Vec<i64> = self.entries.values().map(|e| e.count).filter(|&c| c > 0).collect();
        if counts.is_empty() {
            return 1;
        }
        counts.sort_unstable_by(|a, b| b.cmp(a));

        let mut cumulative = 0i64;
        let mut prev_distinct: Option<i64> = None;
        for &c in &counts {
            cumulative += c;
            let frac = cumulative as f64 / self.total_count as f64;
            if frac >= rate {
                return prev_distinct.unwrap_or(c).max(1);
            }
            if prev_distinct != Some(c) {
                prev_distinct = Some(c);
            }
        }
        prev_distinct.unwrap_or(1).max(1)
    }

    /// The `n` highest-count term IDs, descending.
    pub fn biggest_n(&self, n: usize) -> Vec<TermId> {
        let mut ids: Vec<TermId> = self.entries.keys().copied().collect();
        ids.sort_unstable_by(|a, b| self.get_count(*b).cmp(&self.get_count(*a)));
        ids.truncate(n);
        ids
    }

    pub fn all_ids(&self) -> impl Iterator<Item = TermId> + '_ {
        self.entries.keys().copied()
    }

    /// Replaces every member/entry with `rows`, reassigning dense IDs from 1. Used by phrase
    /// rearrangement, which has already merged surviving templates into their final aggregate
    /// counts and needs a clean slate rather than incremental registration.
    pub fn rebuild(&mut self, rows: impl IntoIterator<Item = (String, i64, i64, i64, String)>) {
        self.max_id = 0;
        self.members.clear();
        self.member_map.clear();
        self.entries.clear();
        self.clear_curr_counters();
        self.total_count = 0;
        for (surface, count, first_seen, last_seen, last_value) in rows {
            if surface.is_empty() {
                continue;
            }
            self.max_id += 1;
            let id = self.max_id;
            self.members.insert(surface.clone(), id);
            self.member_map.insert(id, surface);
            self.entries.insert(id, Entry { count, first_seen, last_seen, last_value });
            self.total_count += count;
        }
    }

    fn clear_curr_counters(&mut self) {
        self.curr_counts.clear();
        self.curr_updates.clear();
        self.curr_create_epochs.clear();
        self.curr_item_count = 0;
    }

    fn to_rows(&self) -> Vec<ItemRow> {
        self.curr_counts
            .iter()
            .filter(|(_, &cnt)| cnt > 0)
            .map(|(&id, &cnt)| ItemRow {
                count: cnt,
                create_epoch: *self.curr_create_epochs.get(&id).unwrap_or(&0),
                last_update: *self.curr_updates.get(&id).unwrap_or(&0),
                item: self.get_member(id).to_string(),
                last_value: self.get_last_value(id).to_string(),
            })
            .collect()
    }

    /// Writes pending per-block rows to disk. A no-op for an in-memory-only dictionary.
    pub fn flush(&mut self) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }
        let rows = self.to_rows();
        self.store.as_mut().unwrap().append_rows(&rows)?;
        Ok(())
    }

    /// Flushes and marks the current block committed, per §6's crash-recovery requirement that
    /// the status table be upserted after every block close.
    pub fn commit(&mut self, completed: bool) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }
        self.flush()?;
        self.store.as_mut().unwrap().update_block_status(completed)?;
        Ok(())
    }

    /// Rotates to the next ring slot, folding the reused block's stale contribution out of the
    /// in-memory counts first (§4.3's reuse invariant).
    pub fn next_block(&mut self, last_epoch: i64) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }
        self.flush()?;
        self.clear_curr_counters();

        let members = &self.members;
        let entries = &mut self.entries;
        let total_count = &mut self.total_count;
        self.store.as_mut().unwrap().next_block::<ItemRow, _>(last_epoch, move |stale_rows| {
            for row in stale_rows {
                if let Some(&id) = members.get(&row.item) {
                    if let Some(entry) = entries.get_mut(&id) {
                        entry.count -= row.count;
                        *total_count -= row.count;
                    }
                }
            }
            Ok(())
        })
    }

    /// Restores in-memory state from disk without double-counting rows already folded in.
    pub fn load(&mut self) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }
        let blocks: Vec<(usize, Vec<ItemRow>)> = self.store.as_mut().unwrap().load()?;
        let current_block_no = self.store.as_ref().unwrap().block_no();
        for (block_no, rows) in blocks {
            let is_current = block_no == current_block_no;
            for row in rows {
                self.register(
                    &row.item,
                    row.count,
                    row.create_epoch,
                    row.last_update,
                    &row.last_value,
                    is_current,
                );
            }
        }
        Ok(())
    }

    /// A detached copy used by the Pipeline to freeze term-census state for pass 3's phrase
    /// rendering (`preTerms` in the original implementation), so later registrations in the live
    /// dictionary don't retroactively change an already-decided border.
    pub fn snapshot(&self) -> Dictionary {
        Dictionary {
            name: self.name.clone(),
            max_id: self.max_id,
            members: self.members.clone(),
            member_map: self.member_map.clone(),
            entries: self.entries.clone(),
            curr_counts: HashMap::new(),
            curr_updates: HashMap::new(),
            curr_create_epochs: HashMap::new(),
            curr_item_count: 0,
            total_count: self.total_count,
            store: None,
        }
    }
}

/// Converts `Err` into `Error::Config` for call sites dealing with an unknown term ID, e.g.
/// template re-tokenization during rearrangement.
pub fn require_known(id: TermId, dict: &Dictionary) -> Result<TermId> {
    if id != NOT_FOUND && dict.member_map.contains_key(&id) {
        Ok(id)
    } else {
        Err(Error::EmptyPhrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_dense_monotonic_ids() {
        let mut d = Dictionary::new("terms");
        let a = d.register("alpha", 1, 100, 100, "line-a", true);
        let b = d.register("beta", 1, 100, 100, "line-b", true);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(d.get_count(a), 1);
    }

    #[test]
    fn empty_surface_returns_not_found() {
        let mut d = Dictionary::new("terms");
        assert_eq!(d.register("", 1, 0, 0, "", true), NOT_FOUND);
    }

    #[test]
    fn repeated_registration_accumulates_counts_and_advances_last_seen() {
        let mut d = Dictionary::new("terms");
        let id = d.register("alpha", 1, 100, 100, "first", true);
        d.register("alpha", 1, 50, 200, "second", true);
        assert_eq!(d.get_count(id), 2);
        assert_eq!(d.get_first_seen(id), 50);
        assert_eq!(d.get_last_seen(id), 200);
        assert_eq!(d.get_last_value(id), "second");
    }

    #[test]
    fn idf_monotonicity_holds() {
        let mut d = Dictionary::new("terms");
        let rare = d.register("rare", 1, 0, 0, "", true);
        let common = d.register("common", 1, 0, 0, "", true);
        for _ in 0..9 {
            d.register("common", 1, 0, 0, "", true);
        }
        assert!(d.get_count(rare) < d.get_count(common));
        assert!(d.get_idf(rare) > d.get_idf(common));
    }

    #[test]
    fn count_border_never_zero_on_empty_dictionary() {
        let d = Dictionary::new("terms");
        assert_eq!(d.get_count_border(0.5), 1);
    }

    #[test]
    fn biggest_n_orders_descending_by_count() {
        let mut d = Dictionary::new("terms");
        let low = d.register("low", 1, 0, 0, "", true);
        let high = d.register("high", 5, 0, 0, "", true);
        for _ in 0..4 {
            d.register("high", 1, 0, 0, "", true);
        }
        let top = d.biggest_n(2);
        assert_eq!(top[0], high);
        assert_eq!(top[1], low);
    }
}
