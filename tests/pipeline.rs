//! End-to-end scenarios over a `Pipeline`: phrase templates, incremental growth, retention
//! watermarks, rearrangement, and novel-line detection.

use rarelog::block_store::Frequency;
use rarelog::config::Config;
use rarelog::pipeline::Pipeline;

fn cfg(data_dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.data_dir = data_dir.to_path_buf();
    cfg.block_size = 1000;
    cfg.max_blocks = 10;
    cfg.min_match_rate = 0.8;
    cfg
}

/// S1: six lines, eight common tokens plus one varying suffix token, collapse into a single
/// phrase whose count equals the number of lines.
#[test]
fn s1_uniform_lines_collapse_to_one_phrase() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    let lines: Vec<(i64, String)> = (0..6)
        .map(|i| {
            (
                1000,
                format!(
                    "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8 varies{i} tail{i}"
                ),
            )
        })
        .collect();
    pipeline.feed(&lines).unwrap();

    let ids = pipeline.phrase_dict().biggest_n(10);
    assert_eq!(ids.len(), 1);
    let id = ids[0];
    assert_eq!(pipeline.phrase_dict().get_count(id), 6);
    assert_eq!(
        pipeline.phrase_dict().get_member(id),
        "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8 * *"
    );
}

/// S2: a second batch with five more matching lines grows the existing phrase's count and adds
/// distinct novel phrases rather than merging into it.
#[test]
fn s2_second_batch_grows_existing_phrase_and_adds_new_ones() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    let first: Vec<(i64, String)> = (0..6)
        .map(|i| {
            (
                1000,
                format!(
                    "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8 varies{i} tail{i}"
                ),
            )
        })
        .collect();
    pipeline.feed(&first).unwrap();
    let id_before = pipeline.phrase_dict().biggest_n(1)[0];
    let count_before = pipeline.phrase_dict().get_count(id_before);

    let mut second: Vec<(i64, String)> = (6..11)
        .map(|i| {
            (
                1000,
                format!(
                    "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8 varies{i} tail{i}"
                ),
            )
        })
        .collect();
    second.push((1000, "totally unrelated novel message one".to_string()));
    second.push((1000, "another entirely different novel message".to_string()));
    pipeline.feed(&second).unwrap();

    assert_eq!(pipeline.phrase_dict().get_count(id_before), count_before + 5);
    assert_eq!(pipeline.phrase_dict().biggest_n(100).len(), 3);
}

/// S6: `Detect()` on a previously-trained corpus with one novel line reports a fresh count of 1
/// and does not persist the new template to disk.
#[test]
fn s6_detect_reports_novel_template_with_count_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    let trained: Vec<(i64, String)> = (0..6)
        .map(|_| (1000, "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8".to_string()))
        .collect();
    pipeline.feed(&trained).unwrap();
    let phrase_count_before = pipeline.phrase_dict().biggest_n(100).len();

    let novel = vec![(2000, "utterly novel wording never seen anywhere before".to_string())];
    let results = pipeline.detect(&novel, |_| true).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].count, 1);
    assert_eq!(pipeline.phrase_dict().biggest_n(100).len(), phrase_count_before);

    let status_path = dir.path().join("phrases").join("CircuitDBStatus").join("status.csv");
    assert!(!status_path.exists());
}

/// `Detect()`'s term registrations must never leak into a later `Feed()` on the same `Pipeline`:
/// a term only ever looked at during `Detect()` stays unregistered in the live term Dictionary.
#[test]
fn detect_does_not_pollute_a_later_feed() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();

    pipeline.detect(&[(1000, "onlyseenduringdetect never registered anywhere".to_string())], |_| true).unwrap();
    assert_eq!(pipeline.term_dict().get_item_id("onlyseenduringdetect"), rarelog::dictionary::NOT_FOUND);

    pipeline.feed(&[(1000, "alpha beta gamma delta".to_string())]).unwrap();
    assert_eq!(pipeline.term_dict().total_count(), 4);
    assert_eq!(pipeline.term_dict().get_item_id("onlyseenduringdetect"), rarelog::dictionary::NOT_FOUND);
}

/// S4: a phrase seen across two hourly buckets carries its create_epoch from the first hour and
/// advances last_update into the second.
#[test]
fn s4_phrase_spans_two_hourly_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = cfg(dir.path());
    c.frequency = Frequency::Hour;
    c.retention = 5;
    let mut pipeline = Pipeline::open(&c).unwrap();

    // Epoch 0 is avoided deliberately: the Dictionary treats a `first_seen` of exactly 0 as "not
    // yet set" (see `register`'s `Entry` handling), so a genuine epoch-0 event would be
    // indistinguishable from an unset one.
    let hour1_epoch = 1_000i64;
    let hour2_epoch = hour1_epoch + 3600;
    // Both hours arrive in the same batch, the way one `Feed()` call over a multi-hour log file
    // would: the phrase tree built in pass 2 sees every line before pass 3 assigns templates, so
    // the shared prefix generalizes even though "tail1"/"tail2" each appear only once.
    pipeline
        .feed(&[
            (hour1_epoch, "grp1a grp2a grp3a grp4a grp5a tail1".to_string()),
            (hour2_epoch, "grp1a grp2a grp3a grp4a grp5a tail2".to_string()),
        ])
        .unwrap();

    let ids = pipeline.phrase_dict().biggest_n(10);
    assert_eq!(ids.len(), 1);
    let id = ids[0];
    assert_eq!(pipeline.phrase_dict().get_count(id), 2);
    assert!(pipeline.phrase_dict().get_first_seen(id) < hour2_epoch);
    assert!(pipeline.phrase_dict().get_last_seen(id) >= hour2_epoch);
}

/// S5: rearranging at a higher rarity threshold collapses ten near-identical templates into one.
#[test]
fn s5_rearrange_collapses_templates_at_higher_border() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = cfg(dir.path());
    c.min_match_rate = 0.3;
    let mut pipeline = Pipeline::open(&c).unwrap();

    let lines: Vec<(i64, String)> = (0..100)
        .map(|i| (1000, format!("shared base words common everywhere distinct{}", i % 10)))
        .collect();
    pipeline.feed(&lines).unwrap();
    assert!(pipeline.phrase_dict().biggest_n(100).len() > 1);

    let rebuilt = pipeline.rearrange_phrases(0.6).unwrap();
    assert!(rebuilt);
    let ids = pipeline.phrase_dict().biggest_n(10);
    assert_eq!(ids.len(), 1);
    assert_eq!(pipeline.phrase_dict().get_count(ids[0]), 100);
}

/// Universal property 3 at the default `retention = 0`: crossing `block_size` distinct phrases
/// must still roll the ring over even though there is no retention watermark driving it.
#[test]
fn block_size_triggers_rollover_with_retention_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = cfg(dir.path());
    c.block_size = 3;
    c.max_blocks = 5;
    assert_eq!(c.retention, 0);
    let mut pipeline = Pipeline::open(&c).unwrap();

    // Every line shares no token with any other, so each becomes its own new phrase and
    // `curr_item_count` grows by exactly one per line.
    let lines: Vec<(i64, String)> =
        (0..13).map(|i| (1000, format!("word{i}a word{i}b word{i}c word{i}d"))).collect();
    pipeline.feed(&lines).unwrap();

    let live = pipeline.phrase_dict().block_store().unwrap().live_block_nos();
    assert!(live.len() > 1, "expected the ring to have rolled more than once, got {live:?}");
}

/// Universal property 1: replaying the same input a second time leaves on-disk counts unchanged.
#[test]
fn property_idempotent_replay() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    pipeline.feed(&[(1000, "alpha beta gamma delta".to_string())]).unwrap();
    let total_after_first = pipeline.phrase_dict().total_count();
    pipeline.feed(&[]).unwrap();
    assert_eq!(pipeline.phrase_dict().total_count(), total_after_first);
}

/// Universal property 2: `Detect()` on a fresh engine succeeds and matches what `Feed()` would
/// have produced for the same lines.
#[test]
fn property_detect_on_fresh_engine_matches_feed() {
    let dir_detect = tempfile::tempdir().unwrap();
    let mut detect_pipeline = Pipeline::open(&cfg(dir_detect.path())).unwrap();
    let lines = vec![(1000, "connection refused from host one".to_string())];
    let results = detect_pipeline.detect(&lines, |_| true).unwrap();
    assert_eq!(results.len(), 1);

    let dir_feed = tempfile::tempdir().unwrap();
    let mut feed_pipeline = Pipeline::open(&cfg(dir_feed.path())).unwrap();
    feed_pipeline.feed(&lines).unwrap();
    let (template, _) = feed_pipeline.analyze_line(&lines[0].1, lines[0].0);

    assert_eq!(results[0].template_string, template);
}

/// Universal property 5: the sum of phrase counts equals the number of lines fed.
#[test]
fn property_count_conservation() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    let lines: Vec<(i64, String)> = (0..20).map(|i| (1000, format!("message number {i} varies here"))).collect();
    pipeline.feed(&lines).unwrap();

    let total: i64 = pipeline.phrase_dict().all_ids().map(|id| pipeline.phrase_dict().get_count(id)).sum();
    assert_eq!(total, lines.len() as i64);
}

/// Universal property 6: re-tokenizing a phrase's own surface form resolves back to the same id.
#[test]
fn property_template_stability() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::open(&cfg(dir.path())).unwrap();
    let lines: Vec<(i64, String)> = (0..6)
        .map(|_| (1000, "comterm1 comterm2 comterm3 comterm4 comterm5 comterm6 comterm7 comterm8".to_string()))
        .collect();
    pipeline.feed(&lines).unwrap();
    let id = pipeline.phrase_dict().biggest_n(1)[0];
    let surface = pipeline.phrase_dict().get_member(id).to_string();

    let (_, template) = pipeline.analyze_line(&surface, 1000);
    let rendered = rarelog::pipeline::render_template(&template, pipeline.term_dict());
    assert_eq!(rendered, surface);
}
