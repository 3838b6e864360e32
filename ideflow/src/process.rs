//! ideflow-process - batch processor for recorded IDE interaction archives
//!
//! Discovers every archive below an archive root, groups archives that belong
//! to the same developer, merges and cleans each group's events, and derives
//! activity intervals from them.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Identifier cache: $XDG_DATA_HOME/ideflow/identifier-cache.db
//! - Logs: $XDG_STATE_HOME/ideflow/ideflow-process.log.<date> (~/.local/state/ideflow/)
//! - Config: $XDG_CONFIG_HOME/ideflow/config.toml (~/.config/ideflow/config.toml)

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use ideflow_core::archive::CacheOutcome;
use ideflow_core::cleanup::CleanupReport;
use ideflow_core::format::{format_duration, format_timestamp_opt};
use ideflow_core::{
    Config, Database, GroupResult, IntervalKind, Pipeline, PipelineReport, ProgressObserver,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ideflow-process")]
#[command(about = "Group, merge, and transform recorded IDE interaction archives")]
#[command(version)]
struct Args {
    /// Root directory containing the archives
    archive_root: PathBuf,

    /// Directory for per-group interval files
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also write each group's merged, cleaned event stream (requires --out)
    #[arg(long, requires = "out")]
    write_merged: bool,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip the identifier cache
    #[arg(long)]
    no_cache: bool,

    /// Configuration file (defaults to the XDG config path)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (-v per-group lines)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if args.no_cache {
        config.pipeline.cache_enabled = false;
    }

    let log_guard = ideflow_core::logging::init(&config.logging, "ideflow-process")
        .context("failed to initialize logging")?;

    tracing::info!(root = %args.archive_root.display(), "ideflow-process starting");

    let db = if config.pipeline.cache_enabled {
        let cache_path = Config::cache_path();
        tracing::info!(path = %cache_path.display(), "Opening identifier cache");
        let db = Database::open(&cache_path).context("failed to open identifier cache")?;
        db.migrate().context("failed to run cache migrations")?;
        Some(db)
    } else {
        None
    };

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out)
            .with_context(|| format!("failed to create output directory {}", out.display()))?;
    }

    let progress = ProgressObserverBar::new(args.json);
    let mut pipeline = Pipeline::new(config)
        .with_observer(&progress)
        .retain_events(args.write_merged);
    if let Some(db) = &db {
        pipeline = pipeline.with_cache(db);
    }

    let mut groups = Vec::new();
    let mut write_error = None;
    let report = pipeline
        .run(&args.archive_root, |result| {
            if write_error.is_none() {
                if let Some(out) = &args.out {
                    if let Err(e) = write_group(out, &result) {
                        write_error = Some(e);
                    }
                }
            }
            groups.push(GroupSummary::from(&result));
        })
        .with_context(|| format!("failed to process {}", args.archive_root.display()))?;
    progress.finish();

    if let Some(e) = write_error {
        return Err(e);
    }

    if args.json {
        let summary = RunSummary {
            report: &report,
            groups: &groups,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&report, &groups, args.verbose);
    }

    tracing::info!(log = %log_guard.path().display(), "ideflow-process finished");
    Ok(())
}

// ============================================
// Progress
// ============================================

/// Two-phase progress bar: archives scanned, then groups processed.
struct ProgressObserverBar {
    pb: ProgressBar,
}

impl ProgressObserverBar {
    fn new(hidden: bool) -> Self {
        let pb = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let template = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        Self { pb }
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressObserver for ProgressObserverBar {
    fn archives_discovered(&self, count: usize) {
        self.pb.set_length(count as u64);
        self.pb.set_message("scanning archives");
    }

    fn archive_scanned(&self, _archive: &str, _outcome: CacheOutcome) {
        self.pb.inc(1);
    }

    fn archive_skipped(&self, archive: &str, reason: &str) {
        self.pb.inc(1);
        tracing::warn!(archive = %archive, reason = %reason, "Archive skipped");
    }

    fn groups_formed(&self, count: usize) {
        self.pb.set_length(count as u64);
        self.pb.set_position(0);
        self.pb.set_message("processing groups");
    }

    fn group_processed(&self, result: &GroupResult) {
        self.pb.inc(1);
        self.pb.set_message(result.label().to_string());
    }

    fn group_failed(&self, label: &str, reason: &str) {
        self.pb.inc(1);
        tracing::error!(group = %label, reason = %reason, "Group failed");
    }
}

// ============================================
// Output
// ============================================

#[derive(Serialize)]
struct RunSummary<'a> {
    report: &'a PipelineReport,
    groups: &'a [GroupSummary],
}

#[derive(Serialize)]
struct GroupSummary {
    index: usize,
    label: String,
    archives: usize,
    identifiers: usize,
    events: usize,
    intervals: usize,
    #[serde(with = "duration_ms")]
    user_active: chrono::TimeDelta,
    first_activity: Option<chrono::DateTime<chrono::Utc>>,
    cleanup: CleanupReport,
}

impl From<&GroupResult> for GroupSummary {
    fn from(result: &GroupResult) -> Self {
        let user_active = result
            .intervals
            .iter()
            .filter(|i| i.kind() == IntervalKind::UserActive)
            .fold(chrono::TimeDelta::zero(), |acc, i| acc + i.duration);
        Self {
            index: result.index,
            label: result.label().to_string(),
            archives: result.group.archives.len(),
            identifiers: result.group.identifiers.len(),
            events: result.merge.events,
            intervals: result.intervals.len(),
            user_active,
            first_activity: result.intervals.iter().map(|i| i.start).min(),
            cleanup: result.cleanup.clone(),
        }
    }
}

mod duration_ms {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &chrono::TimeDelta, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }
}

/// Write `group-NNNN.intervals.jsonl` (and the merged events, when retained).
fn write_group(out: &Path, result: &GroupResult) -> Result<()> {
    let stem = format!("group-{:04}", result.index);

    let path = out.join(format!("{stem}.intervals.jsonl"));
    let mut writer = BufWriter::new(
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?,
    );
    for interval in result.sorted_intervals() {
        serde_json::to_writer(&mut writer, interval)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    if let Some(events) = &result.events {
        let path = out.join(format!("{stem}.events.jsonl"));
        let mut writer = BufWriter::new(
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?,
        );
        for event in events {
            serde_json::to_writer(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }

    tracing::debug!(group = %result.label(), path = %path.display(), "Wrote group output");
    Ok(())
}

fn print_summary(report: &PipelineReport, groups: &[GroupSummary], verbose: u8) {
    println!("Processing complete:");
    println!("  Archives found:      {}", report.archives_found);
    println!("  Archives processed:  {}", report.archives_processed);
    println!("  Archives skipped:    {}", report.archives_skipped.len());
    println!(
        "  Cache hits/misses:   {}/{}",
        report.cache_hits, report.cache_misses
    );
    println!("  Groups formed:       {}", report.groups_formed);
    println!("  Groups failed:       {}", report.groups_failed.len());
    println!("  Events merged:       {}", report.events_merged);
    println!("  Untimed events:      {}", report.untimed_events);
    println!("  Out-of-order events: {}", report.out_of_order_events);
    println!("  Corrupt records:     {}", report.corrupt_records);
    println!("  Concurrent merges:   {}", report.concurrent_merges);
    println!("  Intervals:           {}", report.total_intervals());
    for (kind, count) in &report.intervals_by_kind {
        println!("    {:<18} {}", kind.as_str(), count);
    }

    if !report.archives_skipped.is_empty() {
        println!("\nSkipped archives:");
        for (archive, reason) in &report.archives_skipped {
            println!("  {archive}: {reason}");
        }
    }
    if !report.groups_failed.is_empty() {
        println!("\nFailed groups:");
        for (label, reason) in &report.groups_failed {
            println!("  {label}: {reason}");
        }
    }

    if verbose > 0 && !groups.is_empty() {
        println!("\nGroups:");
        for group in groups {
            println!(
                "  #{:04} {} ({} archive(s), {} events, {} intervals, active {}, from {})",
                group.index,
                group.label,
                group.archives,
                group.events,
                group.intervals,
                format_duration(group.user_active),
                format_timestamp_opt(group.first_activity),
            );
        }
    }
}
