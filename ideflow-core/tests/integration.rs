//! Integration tests for the ideflow pipeline
//!
//! These tests build archive trees in temporary directories and run the full
//! discover, extract, group, merge, clean, and transform flow over them.

use ideflow_core::archive::{discover, IdentifierExtractor};
use ideflow_core::{
    Config, Database, Error, GroupResult, IntervalDetails, IntervalKind, Pipeline, PipelineReport,
    TestResult,
};
use std::path::Path;
use tempfile::TempDir;

/// Write an archive below `root`, creating parent directories.
fn write_archive(root: &Path, relative: &str, lines: &[&str]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn activity(session: &str, at: &str) -> String {
    format!(r#"{{"kind":"activity","session_id":"{session}","triggered_at":"{at}"}}"#)
}

fn activity_until(session: &str, at: &str, until: &str) -> String {
    format!(
        r#"{{"kind":"activity","session_id":"{session}","triggered_at":"{at}","terminated_at":"{until}"}}"#
    )
}

fn run(root: &Path, config: Config, db: Option<&Database>) -> (PipelineReport, Vec<GroupResult>) {
    let mut pipeline = Pipeline::new(config).retain_events(true);
    if let Some(db) = db {
        pipeline = pipeline.with_cache(db);
    }
    let mut groups = Vec::new();
    let report = pipeline.run(root, |g| groups.push(g)).expect("pipeline should succeed");
    (report, groups)
}

/// A{x}, B{x, y}, C{z}
fn three_archive_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "2024/a.jsonl",
        &[&activity("x", "2024-01-01T10:00:00Z")],
    );
    write_archive(
        dir.path(),
        "2024/b.jsonl",
        &[
            &activity("x", "2024-01-01T10:00:30Z"),
            r#"{"kind":"user_profile","profile_id":"y","session_id":"x","triggered_at":"2024-01-01T10:01:00Z"}"#,
            &activity("y", "2024-01-01T10:02:00Z"),
        ],
    );
    write_archive(
        dir.path(),
        "c.jsonl",
        &[&activity("z", "2024-01-01T09:00:00Z")],
    );
    dir
}

// ============================================
// Grouping
// ============================================

#[test]
fn test_groups_archives_by_shared_identifiers() {
    let dir = three_archive_tree();
    let (report, groups) = run(dir.path(), Config::default(), None);

    assert_eq!(report.archives_found, 3);
    assert_eq!(report.groups_formed, 2);

    let memberships: Vec<Vec<String>> = groups.iter().map(|g| g.group.archives.clone()).collect();
    assert_eq!(
        memberships,
        vec![
            vec!["2024/a.jsonl".to_string(), "2024/b.jsonl".to_string()],
            vec!["c.jsonl".to_string()],
        ]
    );
    assert!(groups[0].group.identifiers.contains("x"));
    assert!(groups[0].group.identifiers.contains("y"));
}

#[test]
fn test_every_archive_lands_in_exactly_one_group() {
    let dir = TempDir::new().unwrap();
    for i in 0..12 {
        // Chain i <-> i+1 for even i, giving six pairs.
        let own = format!("s{i}");
        let partner = format!("s{}", i - i % 2);
        write_archive(
            dir.path(),
            &format!("a{i:02}.jsonl"),
            &[
                &activity(&own, "2024-01-01T10:00:00Z"),
                &activity(&partner, "2024-01-01T10:00:01Z"),
            ],
        );
    }

    let (report, groups) = run(dir.path(), Config::default(), None);
    assert_eq!(report.groups_formed, 6);

    let archives = discover(dir.path(), "**/*.jsonl").unwrap();
    for archive in &archives {
        let owners = groups
            .iter()
            .filter(|g| g.group.contains(&archive.relative_path))
            .count();
        assert_eq!(owners, 1, "{} owned by {owners} groups", archive.relative_path);
    }
}

// ============================================
// Merging
// ============================================

#[test]
fn test_merged_stream_is_time_ordered() {
    let dir = three_archive_tree();
    let (_, groups) = run(dir.path(), Config::default(), None);

    for group in &groups {
        let events = group.events.as_ref().unwrap();
        let times: Vec<_> = events.iter().map(|e| e.triggered_at.unwrap()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "unordered: {times:?}");
    }
    assert_eq!(groups[0].events.as_ref().unwrap().len(), 4);
}

#[test]
fn test_corrupt_and_untimed_records_are_counted() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "a.jsonl",
        &[
            &activity("x", "2024-01-01T10:00:00Z"),
            "{not json",
            r#"{"kind":"activity","session_id":"x"}"#,
            &activity("x", "2024-01-01T10:01:00Z"),
        ],
    );

    let (report, groups) = run(dir.path(), Config::default(), None);
    assert_eq!(report.corrupt_records, 1);
    assert_eq!(report.untimed_events, 1);
    assert_eq!(report.events_merged, 2);
    assert!(groups[0].untimed.is_empty());

    let mut config = Config::default();
    config.pipeline.retain_untimed = true;
    let (_, groups) = run(dir.path(), config, None);
    assert_eq!(groups[0].untimed.len(), 1);
}

#[test]
fn test_out_of_order_events_are_dropped() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "a.jsonl",
        &[
            &activity("x", "2024-01-01T10:05:00Z"),
            &activity("x", "2024-01-01T10:00:00Z"),
            &activity("x", "2024-01-01T10:06:00Z"),
        ],
    );

    let (report, groups) = run(dir.path(), Config::default(), None);
    assert_eq!(report.out_of_order_events, 1);
    assert_eq!(groups[0].events.as_ref().unwrap().len(), 2);
}

// ============================================
// Intervals
// ============================================

#[test]
fn test_session_produces_expected_intervals() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "dev.jsonl",
        &[
            r#"{"kind":"ide_state","phase":"startup","session_id":"s1","triggered_at":"2024-03-01T10:00:00Z"}"#,
            r#"{"kind":"edit","session_id":"s1","triggered_at":"2024-03-01T10:05:00Z","active_document":{"file_name":"src/Foo.cs"},"number_of_changes":3}"#,
            r#"{"kind":"test_run","session_id":"s1","triggered_at":"2024-03-01T10:06:00Z","terminated_at":"2024-03-01T10:07:00Z","tests":[{"test_method":"FooTest.A","result":"success"},{"test_method":"FooTest.B","result":"failed"}]}"#,
            r#"{"kind":"ide_state","phase":"shutdown","session_id":"s1","triggered_at":"2024-03-01T10:30:00Z"}"#,
        ],
    );

    let (report, groups) = run(dir.path(), Config::default(), None);
    let group = &groups[0];

    let ide: Vec<_> = group
        .intervals
        .iter()
        .filter(|i| i.kind() == IntervalKind::IdeOpened)
        .collect();
    assert_eq!(ide.len(), 1);
    assert_eq!(ide[0].duration.num_minutes(), 30);

    let tests: Vec<_> = group
        .intervals
        .iter()
        .filter(|i| i.kind() == IntervalKind::TestRun)
        .collect();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].duration.num_minutes(), 1);
    match &tests[0].details {
        IntervalDetails::TestRun {
            test_count, result, ..
        } => {
            assert_eq!(*test_count, 2);
            assert_eq!(*result, TestResult::Failed);
        }
        other => panic!("unexpected details: {other:?}"),
    }

    // 10:07 to 10:30 exceeds the default 16 minute inactivity gap.
    assert_eq!(report.intervals_by_kind[&IntervalKind::UserActive], 2);

    let sorted = group.sorted_intervals();
    assert!(sorted.windows(2).all(|w| w[0].start <= w[1].start));
}

/// A{x} and B{x, y} share session x; their events at minute offsets
/// {0,5} {3,6} {9,10} {26,30} form one activity period. C{z} stays apart.
#[test]
fn test_linked_archives_form_one_activity_period() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "a.jsonl",
        &[
            &activity_until("x", "2024-01-01T10:00:00Z", "2024-01-01T10:05:00Z"),
            &activity_until("x", "2024-01-01T10:09:00Z", "2024-01-01T10:10:00Z"),
        ],
    );
    write_archive(
        dir.path(),
        "b.jsonl",
        &[
            &activity_until("x", "2024-01-01T10:03:00Z", "2024-01-01T10:06:00Z"),
            r#"{"kind":"user_profile","profile_id":"y","session_id":"x","triggered_at":"2024-01-01T10:26:00Z","terminated_at":"2024-01-01T10:30:00Z"}"#,
        ],
    );
    write_archive(
        dir.path(),
        "c.jsonl",
        &[&activity("z", "2024-01-01T10:00:00Z")],
    );

    let (report, groups) = run(dir.path(), Config::default(), None);

    let memberships: Vec<Vec<String>> = groups.iter().map(|g| g.group.archives.clone()).collect();
    assert_eq!(
        memberships,
        vec![
            vec!["a.jsonl".to_string(), "b.jsonl".to_string()],
            vec!["c.jsonl".to_string()],
        ]
    );
    assert_eq!(report.groups_formed, 2);

    let starts: Vec<_> = groups[0]
        .events
        .as_ref()
        .unwrap()
        .iter()
        .map(|e| e.triggered_at.unwrap().format("%H:%M").to_string())
        .collect();
    assert_eq!(starts, ["10:00", "10:03", "10:09", "10:26"]);

    let active: Vec<_> = groups[0]
        .intervals
        .iter()
        .filter(|i| i.kind() == IntervalKind::UserActive)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, "x");
    assert_eq!(active[0].start.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    assert_eq!(active[0].duration.num_minutes(), 30);

    let other: Vec<_> = groups[1]
        .intervals
        .iter()
        .filter(|i| i.kind() == IntervalKind::UserActive)
        .collect();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].session_id, "z");
    assert_eq!(report.intervals_by_kind[&IntervalKind::UserActive], 2);
}

#[test]
fn test_bare_transformer_names_disable_transformers() {
    let dir = three_archive_tree();
    let mut config = Config::default();
    config.intervals.disabled_transformers = vec!["user_active".to_string()];

    let (report, _) = run(dir.path(), config, None);
    assert!(!report.intervals_by_kind.contains_key(&IntervalKind::UserActive));
    assert!(report.intervals_by_kind.contains_key(&IntervalKind::IdeOpened));
}

#[test]
fn test_disabled_transformer_emits_nothing() {
    let dir = three_archive_tree();
    let mut config = Config::default();
    config.intervals.disabled_transformers = vec!["core.user_active".to_string()];

    let (report, _) = run(dir.path(), config, None);
    assert!(!report.intervals_by_kind.contains_key(&IntervalKind::UserActive));
    assert!(report.intervals_by_kind.contains_key(&IntervalKind::IdeOpened));
}

#[test]
fn test_runs_are_deterministic() {
    let dir = three_archive_tree();
    let (first_report, first) = run(dir.path(), Config::default(), None);

    let mut config = Config::default();
    config.pipeline.workers = 1;
    let (second_report, second) = run(dir.path(), config, None);

    assert_eq!(first_report, second_report);
    let first: Vec<_> = first.iter().map(|g| g.intervals.clone()).collect();
    let second: Vec<_> = second.iter().map(|g| g.intervals.clone()).collect();
    assert_eq!(first, second);
}

// ============================================
// Identifier cache
// ============================================

#[test]
fn test_cache_hits_on_second_run_and_invalidates_on_change() {
    let dir = three_archive_tree();
    let cache_dir = TempDir::new().unwrap();
    let db = Database::open(&cache_dir.path().join("cache.db")).unwrap();
    db.migrate().unwrap();

    let (first, _) = run(dir.path(), Config::default(), Some(&db));
    assert_eq!(first.cache_misses, 3);
    assert_eq!(first.cache_hits, 0);

    let (second, _) = run(dir.path(), Config::default(), Some(&db));
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.cache_misses, 0);

    write_archive(
        dir.path(),
        "c.jsonl",
        &[
            &activity("z", "2024-01-01T09:00:00Z"),
            &activity("x", "2024-01-01T09:30:00Z"),
        ],
    );
    let (third, groups) = run(dir.path(), Config::default(), Some(&db));
    assert_eq!(third.cache_hits, 2);
    assert_eq!(third.cache_misses, 1);
    assert_eq!(groups.len(), 1);
}

#[test]
fn test_cache_disabled_by_config() {
    let dir = three_archive_tree();
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();

    let mut config = Config::default();
    config.pipeline.cache_enabled = false;
    let (report, _) = run(dir.path(), config, Some(&db));
    assert_eq!(report.cache_hits + report.cache_misses, 0);

    let extractor = IdentifierExtractor::new(dir.path(), Some(&db));
    assert_eq!(db.identifier_cache_len(extractor.archive_root()).unwrap(), 0);
}

// ============================================
// Failures
// ============================================

#[test]
fn test_unreadable_root_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = Pipeline::new(Config::default()).run(&dir.path().join("nope"), |_| {});
    assert!(matches!(result, Err(Error::InputRoot(_))));
}

#[test]
fn test_empty_root_yields_empty_report() {
    let dir = TempDir::new().unwrap();
    let (report, groups) = run(dir.path(), Config::default(), None);
    assert_eq!(report.archives_found, 0);
    assert_eq!(report.groups_formed, 0);
    assert!(groups.is_empty());
}
