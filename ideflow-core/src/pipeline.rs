//! Batch pipeline over an archive root
//!
//! Orchestrates the whole run:
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────┐   ┌──────────────────────────────┐
//! │ discover │──►│  extract   │──►│  group  │──►│ per group (parallel):        │
//! │ archives │   │ identifiers│   │ (global)│   │ merge ─► clean ─► transform  │
//! └──────────┘   │ (parallel, │   └─────────┘   └──────────────────────────────┘
//!                │  cached)   │
//!                └────────────┘
//! ```
//!
//! Groups are independent, so they are processed on a worker pool. Within a
//! group every stage runs sequentially in time order. Failures are isolated:
//! an unreadable archive is skipped, a failed group is reported, and only an
//! unreadable archive root aborts the run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ideflow_core::{Config, Database, Pipeline};
//!
//! let db = Database::open(&Config::cache_path())?;
//! db.migrate()?;
//! let report = Pipeline::new(Config::load()?)
//!     .with_cache(&db)
//!     .run(Path::new("/data/archives"), |group| {
//!         println!("{}: {} intervals", group.label(), group.intervals.len());
//!     })?;
//! ```

use crate::archive::{self, CacheOutcome, IdentifierExtractor};
use crate::cleanup::{create_default_cleaner, Cleaner, CleanupReport};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::grouping::Grouper;
use crate::intervals::{create_default_transformers, IntervalEngine, IntervalTransformer};
use crate::merge::{MergeStats, Merger};
use crate::types::{Archive, Interval, IntervalKind, RawEvent, UserGroup};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================
// Progress reporting
// ============================================

/// Receives progress callbacks during a run.
///
/// Callbacks may arrive from worker threads. All methods default to no-ops.
pub trait ProgressObserver: Sync {
    fn archives_discovered(&self, _count: usize) {}
    fn archive_scanned(&self, _archive: &str, _outcome: CacheOutcome) {}
    fn archive_skipped(&self, _archive: &str, _reason: &str) {}
    fn groups_formed(&self, _count: usize) {}
    fn group_processed(&self, _result: &GroupResult) {}
    fn group_failed(&self, _label: &str, _reason: &str) {}
}

/// Logs every callback through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn archives_discovered(&self, count: usize) {
        tracing::info!(archives = count, "Discovered archives");
    }

    fn archive_scanned(&self, archive: &str, outcome: CacheOutcome) {
        tracing::debug!(archive = %archive, cache_hit = outcome == CacheOutcome::Hit, "Extracted identifiers");
    }

    fn archive_skipped(&self, archive: &str, reason: &str) {
        tracing::warn!(archive = %archive, reason = %reason, "Archive skipped");
    }

    fn groups_formed(&self, count: usize) {
        tracing::info!(groups = count, "Formed user groups");
    }

    fn group_processed(&self, result: &GroupResult) {
        tracing::info!(
            group = %result.label(),
            archives = result.group.archives.len(),
            events = result.merge.events,
            intervals = result.intervals.len(),
            "Processed group"
        );
    }

    fn group_failed(&self, label: &str, reason: &str) {
        tracing::error!(group = %label, reason = %reason, "Group failed");
    }
}

// ============================================
// Results
// ============================================

/// Output of one user group.
#[derive(Debug, Clone)]
pub struct GroupResult {
    /// Position of the group in the deterministic group order
    pub index: usize,
    pub group: UserGroup,
    /// Cleaned, ordered events (only when the pipeline retains events)
    pub events: Option<Vec<RawEvent>>,
    /// Events without time data (only with `pipeline.retain_untimed`)
    pub untimed: Vec<RawEvent>,
    /// Intervals in completion order
    pub intervals: Vec<Interval>,
    pub cleanup: CleanupReport,
    pub merge: MergeStats,
}

impl GroupResult {
    pub fn label(&self) -> &str {
        self.group.label()
    }

    /// Intervals sorted by start, then kind.
    pub fn sorted_intervals(&self) -> Vec<&Interval> {
        let mut sorted: Vec<&Interval> = self.intervals.iter().collect();
        sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.kind().cmp(&b.kind())));
        sorted
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub archives_found: usize,
    pub archives_processed: usize,
    /// `(archive, reason)` for every archive left out of the run
    pub archives_skipped: Vec<(String, String)>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub groups_formed: usize,
    /// `(group label, reason)` for every failed group
    pub groups_failed: Vec<(String, String)>,
    pub events_merged: usize,
    pub untimed_events: usize,
    pub out_of_order_events: usize,
    pub corrupt_records: usize,
    pub concurrent_merges: usize,
    pub intervals_by_kind: BTreeMap<IntervalKind, usize>,
}

impl PipelineReport {
    pub fn total_intervals(&self) -> usize {
        self.intervals_by_kind.values().sum()
    }

    fn absorb_failure(&mut self, failure: GroupFailure) {
        self.archives_skipped.extend(failure.unreadable);
        self.groups_failed.push((failure.label, failure.reason));
    }

    fn absorb(&mut self, result: &GroupResult) {
        self.archives_processed +=
            result.group.archives.len() - result.merge.unreadable_archives.len();
        self.archives_skipped
            .extend(result.merge.unreadable_archives.iter().cloned());
        self.events_merged += result.merge.events;
        self.untimed_events += result.merge.untimed_events;
        self.out_of_order_events += result.merge.out_of_order_events;
        self.corrupt_records += result.merge.corrupt_records;
        self.concurrent_merges += result.cleanup.concurrent_merges;
        for interval in &result.intervals {
            *self.intervals_by_kind.entry(interval.kind()).or_insert(0) += 1;
        }
    }
}

/// A group none of whose member archives could be read.
#[derive(Debug)]
struct GroupFailure {
    label: String,
    reason: String,
    /// `(archive, reason)` for every member that failed to open
    unreadable: Vec<(String, String)>,
}

// ============================================
// Pipeline
// ============================================

type TransformerFactory<'a> = Box<dyn Fn() -> Vec<Box<dyn IntervalTransformer>> + Send + Sync + 'a>;
type CleanerFactory<'a> = Box<dyn Fn() -> Cleaner + Send + Sync + 'a>;

/// One batch run configuration.
pub struct Pipeline<'a> {
    config: Config,
    db: Option<&'a Database>,
    observer: &'a dyn ProgressObserver,
    retain_events: bool,
    transformers: TransformerFactory<'a>,
    cleaner: CleanerFactory<'a>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with the default cleaner and transformers, without cache.
    pub fn new(config: Config) -> Self {
        let cleanup = config.cleanup.clone();
        let intervals = config.intervals.clone();
        Self {
            config,
            db: None,
            observer: &TracingObserver,
            retain_events: false,
            transformers: Box::new(move || create_default_transformers(&intervals)),
            cleaner: Box::new(move || create_default_cleaner(&cleanup)),
        }
    }

    /// Use the identifier cache (ignored when `pipeline.cache_enabled` is off).
    pub fn with_cache(mut self, db: &'a Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Keep each group's cleaned events in its [`GroupResult`].
    pub fn retain_events(mut self, retain: bool) -> Self {
        self.retain_events = retain;
        self
    }

    /// Replace the transformer set. Called once per group; must build fresh instances.
    pub fn with_transformers<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Vec<Box<dyn IntervalTransformer>> + Send + Sync + 'a,
    {
        self.transformers = Box::new(factory);
        self
    }

    /// Replace the cleanup chain. Called once per group.
    pub fn with_cleaner<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Cleaner + Send + Sync + 'a,
    {
        self.cleaner = Box::new(factory);
        self
    }

    /// Run over every archive under `root`.
    ///
    /// `sink` receives each group's result in group order. Fails only if the
    /// root is unreadable or the configuration is unusable.
    pub fn run<F>(&self, root: &Path, mut sink: F) -> Result<PipelineReport>
    where
        F: FnMut(GroupResult),
    {
        self.config.validate()?;
        let archives = archive::discover(root, &self.config.pipeline.archive_pattern)?;
        self.observer.archives_discovered(archives.len());

        let mut report = PipelineReport {
            archives_found: archives.len(),
            ..PipelineReport::default()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.pipeline.workers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build worker pool: {e}")))?;

        // Extract
        let db = self.db.filter(|_| self.config.pipeline.cache_enabled);
        let extractor = IdentifierExtractor::new(root, db);
        let extractions: Vec<_> = pool.install(|| {
            archives
                .par_iter()
                .map(|a| (a, extractor.extract(a)))
                .collect()
        });

        let mut grouper = Grouper::new();
        let mut by_path: HashMap<String, Archive> = HashMap::new();
        for (archive, extraction) in extractions {
            match extraction {
                Ok(extraction) => {
                    match extraction.outcome {
                        CacheOutcome::Hit => report.cache_hits += 1,
                        CacheOutcome::Miss => report.cache_misses += 1,
                        CacheOutcome::Disabled => {}
                    }
                    self.observer
                        .archive_scanned(&archive.relative_path, extraction.outcome);
                    grouper.add(archive.relative_path.clone(), extraction.identifiers);
                    by_path.insert(archive.relative_path.clone(), archive.clone());
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.observer.archive_skipped(&archive.relative_path, &reason);
                    report
                        .archives_skipped
                        .push((archive.relative_path.clone(), reason));
                }
            }
        }

        // Group
        let groups = grouper.group();
        report.groups_formed = groups.len();
        self.observer.groups_formed(groups.len());

        // Merge, clean, transform
        let results: Vec<std::result::Result<GroupResult, GroupFailure>> = pool.install(|| {
            groups
                .into_par_iter()
                .enumerate()
                .map(|(index, group)| {
                    let result = self.process_group(index, group, &by_path);
                    if let Ok(result) = &result {
                        self.observer.group_processed(result);
                    }
                    result
                })
                .collect()
        });

        for result in results {
            match result {
                Ok(result) => {
                    report.absorb(&result);
                    sink(result);
                }
                Err(failure) => {
                    self.observer.group_failed(&failure.label, &failure.reason);
                    report.absorb_failure(failure);
                }
            }
        }

        tracing::info!(
            archives = report.archives_found,
            skipped = report.archives_skipped.len(),
            groups = report.groups_formed,
            intervals = report.total_intervals(),
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Merge, clean and transform one group, strictly in time order.
    fn process_group(
        &self,
        index: usize,
        group: UserGroup,
        archives: &HashMap<String, Archive>,
    ) -> std::result::Result<GroupResult, GroupFailure> {
        let members: Vec<Archive> = group
            .archives
            .iter()
            .filter_map(|path| archives.get(path).cloned())
            .collect();

        let mut stream = Merger::new(self.config.pipeline.retain_untimed).merge(&members);
        let mut cleaner = (self.cleaner)();
        let mut engine = IntervalEngine::with_transformers((self.transformers)());

        let mut events = self.retain_events.then(Vec::new);
        let mut intervals = Vec::new();
        let mut deliver = |cleaned: Vec<RawEvent>| {
            for event in cleaned {
                intervals.extend(engine.process(&event));
                if let Some(events) = events.as_mut() {
                    events.push(event);
                }
            }
        };

        for event in stream.by_ref() {
            deliver(cleaner.push(event));
        }
        deliver(cleaner.finish());
        intervals.extend(engine.end_of_stream());

        let merge = stream.stats();
        if !members.is_empty() && merge.unreadable_archives.len() == members.len() {
            return Err(GroupFailure {
                label: group.label().to_string(),
                reason: "no member archive could be read".to_string(),
                unreadable: merge.unreadable_archives,
            });
        }

        Ok(GroupResult {
            index,
            untimed: stream.take_untimed(),
            group,
            events,
            intervals,
            cleanup: cleaner.report(),
            merge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, lines: &[&str]) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, lines.join("\n")).unwrap();
    }

    #[derive(Default)]
    struct Counting {
        scanned: AtomicUsize,
        processed: AtomicUsize,
    }

    impl ProgressObserver for Counting {
        fn archive_scanned(&self, _archive: &str, _outcome: CacheOutcome) {
            self.scanned.fetch_add(1, Ordering::SeqCst);
        }

        fn group_processed(&self, _result: &GroupResult) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_run_groups_and_reports() {
        crate::logging::init_test();
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "a.jsonl",
            &[r#"{"kind":"activity","session_id":"x","triggered_at":"2024-01-01T10:00:00Z"}"#],
        );
        write(
            &dir,
            "b.jsonl",
            &[
                r#"{"kind":"activity","session_id":"x","triggered_at":"2024-01-01T10:01:00Z"}"#,
                r#"{"kind":"user_profile","profile_id":"y","session_id":"x","triggered_at":"2024-01-01T10:02:00Z"}"#,
            ],
        );
        write(
            &dir,
            "c.jsonl",
            &[r#"{"kind":"activity","session_id":"z","triggered_at":"2024-01-01T11:00:00Z"}"#],
        );

        let observer = Counting::default();
        let mut results = Vec::new();
        let report = Pipeline::new(Config::default())
            .with_observer(&observer)
            .retain_events(true)
            .run(dir.path(), |r| results.push(r))
            .unwrap();

        assert_eq!(report.archives_found, 3);
        assert_eq!(report.archives_processed, 3);
        assert_eq!(report.groups_formed, 2);
        assert_eq!(report.events_merged, 4);
        assert!(report.groups_failed.is_empty());
        assert_eq!(observer.scanned.load(Ordering::SeqCst), 3);
        assert_eq!(observer.processed.load(Ordering::SeqCst), 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].group.archives, vec!["a.jsonl", "b.jsonl"]);
        assert_eq!(results[0].events.as_ref().unwrap().len(), 3);
        assert_eq!(results[1].group.archives, vec!["c.jsonl"]);
        assert_eq!(report.intervals_by_kind[&IntervalKind::UserActive], 2);
    }

    #[test]
    fn test_missing_root_aborts() {
        let dir = TempDir::new().unwrap();
        let result = Pipeline::new(Config::default()).run(&dir.path().join("missing"), |_| {});
        assert!(matches!(result, Err(Error::InputRoot(_))));
    }

    #[test]
    fn test_unreadable_group_reports_its_archives() {
        let dir = TempDir::new().unwrap();
        let group = UserGroup {
            archives: vec!["gone/a.jsonl".to_string(), "gone/b.jsonl".to_string()],
            identifiers: ["x".to_string()].into_iter().collect(),
        };
        let by_path: HashMap<String, Archive> = group
            .archives
            .iter()
            .map(|rel| {
                let archive = Archive {
                    relative_path: rel.clone(),
                    path: dir.path().join(rel),
                };
                (rel.clone(), archive)
            })
            .collect();

        let pipeline = Pipeline::new(Config::default());
        let failure = pipeline.process_group(0, group, &by_path).unwrap_err();
        assert_eq!(failure.label, "gone/a.jsonl");
        assert_eq!(failure.unreadable.len(), 2);

        let mut report = PipelineReport::default();
        report.absorb_failure(failure);
        let skipped: Vec<_> = report.archives_skipped.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(skipped, ["gone/a.jsonl", "gone/b.jsonl"]);
        assert_eq!(report.groups_failed.len(), 1);
        assert_eq!(report.groups_failed[0].0, "gone/a.jsonl");
    }

    #[test]
    fn test_invalid_config_is_rejected_before_processing() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "a.jsonl",
            &[r#"{"kind":"activity","session_id":"x","triggered_at":"2024-01-01T10:00:00Z"}"#],
        );

        let mut config = Config::default();
        config.intervals.file_timeout_secs = u64::MAX;
        let mut delivered = 0;
        let result = Pipeline::new(config).run(dir.path(), |_| delivered += 1);
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_custom_transformer_factory() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "a.jsonl",
            &[r#"{"kind":"activity","session_id":"x","triggered_at":"2024-01-01T10:00:00Z"}"#],
        );

        let report = Pipeline::new(Config::default())
            .with_transformers(Vec::new)
            .run(dir.path(), |_| {})
            .unwrap();
        assert_eq!(report.total_intervals(), 0);
        assert_eq!(report.events_merged, 1);
    }
}
