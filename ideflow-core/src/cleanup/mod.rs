//! Cleanup heuristics for merged event streams
//!
//! A [`Cleaner`] runs an ordered chain of [`CleanupFilter`]s over one merged
//! stream. Each filter consumes the output of the previous one and must keep
//! the stream time-ordered.
//!
//! ## Default chain
//!
//! 1. [`TimeDataFixer`]: drop untimed events, normalize end times
//! 2. [`NoiseFilter`]: drop administrative kinds and nameless commands
//! 3. [`DuplicateRemover`]: drop exact duplicates
//! 4. [`ConcurrentCommandMerger`]: collapse commands recorded twice
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ideflow_core::cleanup::create_default_cleaner;
//!
//! let mut cleaner = create_default_cleaner(&config.cleanup);
//! for event in merged {
//!     for cleaned in cleaner.push(event) {
//!         engine.process(&cleaned);
//!     }
//! }
//! let rest = cleaner.finish();
//! println!("{:?}", cleaner.report());
//! ```

pub mod commands;
pub mod concurrent;
pub mod filters;

pub use commands::{compare, compare_commands, CommandClass};
pub use concurrent::{ConcurrentCommandMerger, ConcurrentEventHeuristic};
pub use filters::{DuplicateRemover, NoiseFilter, TimeDataFixer};

use crate::config::CleanupConfig;
use crate::types::RawEvent;
use serde::Serialize;

// ============================================
// Filter trait
// ============================================

/// One step of the cleanup chain.
///
/// Filters may hold back events (to compare them with their neighbours) and
/// release them later, but must emit them in time order.
pub trait CleanupFilter: Send {
    /// Human-readable name, used in the cleanup report
    fn name(&self) -> &str;

    /// Consume one event, returning the events that are ready downstream.
    fn process(&mut self, event: RawEvent) -> Vec<RawEvent>;

    /// Release everything still held back. Called once, after the last event.
    fn end_of_stream(&mut self) -> Vec<RawEvent> {
        vec![]
    }

    /// Number of events this filter folded into other events.
    fn merged_events(&self) -> usize {
        0
    }
}

// ============================================
// Report
// ============================================

/// Event counts after each cleanup stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// `(stage label, events)`, starting with the input count
    pub stages: Vec<(String, usize)>,
    /// Concurrent command pairs collapsed into one event
    pub concurrent_merges: usize,
}

impl CleanupReport {
    /// Events entering the chain
    pub fn input(&self) -> usize {
        self.stages.first().map(|(_, n)| *n).unwrap_or(0)
    }

    /// Events leaving the chain
    pub fn output(&self) -> usize {
        self.stages.last().map(|(_, n)| *n).unwrap_or(0)
    }
}

// ============================================
// Cleaner
// ============================================

/// Ordered chain of cleanup filters with per-stage counters.
pub struct Cleaner {
    filters: Vec<Box<dyn CleanupFilter>>,
    counts: Vec<usize>,
    finished: bool,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner {
    /// Create an empty chain; events pass through unchanged.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            counts: vec![0],
            finished: false,
        }
    }

    /// Append a filter to the end of the chain.
    pub fn register(&mut self, filter: Box<dyn CleanupFilter>) {
        tracing::debug!(filter = filter.name(), "Registered cleanup filter");
        self.filters.push(filter);
        self.counts.push(0);
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run `events` through the filters starting at index `from`.
    fn run_from(&mut self, from: usize, mut events: Vec<RawEvent>) -> Vec<RawEvent> {
        for index in from..self.filters.len() {
            let mut next = Vec::with_capacity(events.len());
            for event in events {
                next.extend(self.filters[index].process(event));
            }
            self.counts[index + 1] += next.len();
            events = next;
        }
        events
    }

    /// Feed one event; returns the cleaned events that are ready.
    pub fn push(&mut self, event: RawEvent) -> Vec<RawEvent> {
        assert!(!self.finished, "event pushed into a finished cleaner");
        self.counts[0] += 1;
        self.run_from(0, vec![event])
    }

    /// Flush every filter in chain order; returns the remaining events.
    pub fn finish(&mut self) -> Vec<RawEvent> {
        assert!(!self.finished, "cleaner finished twice");
        self.finished = true;

        let mut out = Vec::new();
        for index in 0..self.filters.len() {
            let released = self.filters[index].end_of_stream();
            self.counts[index + 1] += released.len();
            out.extend(self.run_from(index + 1, released));
        }
        out
    }

    /// Clean a whole stream at once.
    pub fn clean_all(&mut self, events: impl IntoIterator<Item = RawEvent>) -> Vec<RawEvent> {
        let mut out = Vec::new();
        for event in events {
            out.extend(self.push(event));
        }
        out.extend(self.finish());
        out
    }

    /// Stage counts so far; complete after [`Cleaner::finish`].
    pub fn report(&self) -> CleanupReport {
        let mut stages = Vec::with_capacity(self.counts.len());
        stages.push(("before applying any filter".to_string(), self.counts[0]));
        for (filter, count) in self.filters.iter().zip(&self.counts[1..]) {
            stages.push((format!("after applying '{}'", filter.name()), *count));
        }
        CleanupReport {
            stages,
            concurrent_merges: self.filters.iter().map(|f| f.merged_events()).sum(),
        }
    }
}

/// Create a cleaner with the default filter chain.
pub fn create_default_cleaner(config: &CleanupConfig) -> Cleaner {
    let mut cleaner = Cleaner::new();
    cleaner.register(Box::new(TimeDataFixer));
    cleaner.register(Box::new(NoiseFilter::from_config(config)));
    cleaner.register(Box::new(DuplicateRemover::default()));
    cleaner.register(Box::new(ConcurrentCommandMerger::new(
        ConcurrentEventHeuristic::from_config(config),
    )));
    cleaner
}
